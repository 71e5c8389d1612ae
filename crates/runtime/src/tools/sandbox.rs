//! Sandboxed evaluation of script tool bodies.
//!
//! Scripts are JavaScript run by an embedded `boa_engine` interpreter on a
//! blocking thread. A fresh context is built per call and only the globals
//! granted by policy are defined in it:
//!
//! - `params`: the action data, deep-frozen (always present)
//! - `tools`: schemas of the registered tools, deep-frozen (`tool_schemas`)
//! - `console`: `log`/`info`/`debug`/`warn`/`error`, routed to tracing (`console`)
//! - `setTimeout`/`setInterval` and their `clear*` pair (`timers`)
//!
//! Timers run on a virtual clock once the script body has finished. The
//! completion value of the script is the tool result.
//!
//! The interpreter is stepped: it yields periodically, and a run that passes
//! its deadline or is cancelled is dropped on the spot rather than left
//! spinning on its thread.

use super::ToolError;
use boa_engine::{Context, JsValue, Script, Source, js_string};
use policy::{CapabilityKind, Policy, SandboxLimits};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Interpreter steps between deadline and cancellation checks.
const STEP_BUDGET: u32 = 4_096;

/// Extra wait for a script stuck inside one builtin call before the caller
/// is released without it.
const STOP_GRACE: Duration = Duration::from_secs(1);

/// Builds the globals and returns a `finish(result, budget)` closure that
/// drains timers and reports `{result, logs, pending}` as JSON text.
const PRELUDE: &str = r#"
(function (granted) {
  const deepFreeze = (value) => {
    if (value !== null && typeof value === "object" && !Object.isFrozen(value)) {
      Object.freeze(value);
      for (const key of Object.keys(value)) deepFreeze(value[key]);
    }
    return value;
  };
  const define = (name, value) =>
    Object.defineProperty(globalThis, name, {
      value,
      writable: false,
      enumerable: false,
      configurable: false,
    });

  define("params", deepFreeze(JSON.parse(granted.params)));
  if (granted.tools !== null) define("tools", deepFreeze(JSON.parse(granted.tools)));

  const logs = [];
  if (granted.console) {
    const format = (value) => {
      if (typeof value === "string") return value;
      try {
        const text = JSON.stringify(value);
        return text === undefined ? String(value) : text;
      } catch (_) {
        return String(value);
      }
    };
    const emit = (level) => (...args) => {
      logs.push({ level, message: args.map(format).join(" ") });
    };
    define("console", Object.freeze({
      log: emit("info"),
      info: emit("info"),
      debug: emit("debug"),
      warn: emit("warn"),
      error: emit("error"),
    }));
  }

  const timers = new Map();
  let nextId = 1;
  let now = 0;
  if (granted.timers) {
    const schedule = (repeat) => (callback, delay, ...args) => {
      if (typeof callback !== "function") throw new TypeError("timer callback must be a function");
      const id = nextId++;
      const wait = Math.max(0, Number(delay) || 0);
      timers.set(id, { callback, args, wait, repeat, at: now + wait });
      return id;
    };
    const clear = (id) => { timers.delete(id); };
    define("setTimeout", schedule(false));
    define("setInterval", schedule(true));
    define("clearTimeout", clear);
    define("clearInterval", clear);
  }

  return function finish(result, budget) {
    let fired = 0;
    while (timers.size > 0 && fired < budget) {
      let dueId = null;
      let due = null;
      for (const [id, timer] of timers) {
        if (due === null || timer.at < due.at) {
          dueId = id;
          due = timer;
        }
      }
      now = due.at;
      if (due.repeat) {
        due.at = now + Math.max(1, due.wait);
      } else {
        timers.delete(dueId);
      }
      fired++;
      due.callback(...due.args);
    }
    return JSON.stringify({
      result: result === undefined ? null : result,
      logs,
      pending: timers.size,
    });
  };
})
"#;

/// Which sandbox globals a run receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Grants {
    console: bool,
    timers: bool,
    tool_schemas: bool,
}

impl Grants {
    fn from_policy(policy: &Policy) -> Self {
        Self {
            console: policy.grants(CapabilityKind::Console),
            timers: policy.grants(CapabilityKind::Timers),
            tool_schemas: policy.grants(CapabilityKind::ToolSchemas),
        }
    }
}

#[derive(Serialize)]
struct Granted {
    params: String,
    tools: Option<String>,
    console: bool,
    timers: bool,
}

#[derive(Debug, Deserialize)]
struct Report {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    logs: Vec<LogLine>,
    #[serde(default)]
    pending: usize,
}

#[derive(Debug, Deserialize)]
struct LogLine {
    level: String,
    message: String,
}

/// Executes script tool bodies under a [`Policy`].
#[derive(Debug, Clone)]
pub struct Sandbox {
    grants: Grants,
    limits: SandboxLimits,
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::new(&Policy::default())
    }
}

impl Sandbox {
    pub fn new(policy: &Policy) -> Self {
        Self {
            grants: Grants::from_policy(policy),
            limits: policy.limits,
        }
    }

    pub fn limits(&self) -> SandboxLimits {
        self.limits
    }

    /// Run `source` with `params` bound, honoring the wall-clock limit and `cancel`.
    ///
    /// `tools_view` is exposed as the `tools` global only when the policy
    /// grants `tool_schemas`.
    pub async fn run(
        &self,
        tool: &str,
        source: &str,
        params: &Value,
        tools_view: Value,
        cancel: &CancellationToken,
    ) -> Result<Value, ToolError> {
        let granted = Granted {
            params: params.to_string(),
            tools: self.grants.tool_schemas.then(|| tools_view.to_string()),
            console: self.grants.console,
            timers: self.grants.timers,
        };
        let setup = serde_json::to_string(&granted).map_err(|e| ToolError::execution(tool, e))?;
        let script = source.to_string();
        let limits = self.limits;
        let deadline = Instant::now() + limits.timeout();
        let stop = cancel.clone();

        let handle = tokio::task::spawn_blocking(move || {
            evaluate_until(&setup, &script, limits, deadline, &stop)
        });

        let timed_out = || ToolError::Timeout {
            tool: tool.to_string(),
            timeout_ms: limits.timeout_ms,
        };
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ToolError::Cancelled(tool.to_string())),
            joined = tokio::time::timeout(limits.timeout() + STOP_GRACE, handle) => match joined {
                Err(_) => {
                    warn!(tool, "interpreter still busy past its deadline; releasing caller");
                    return Err(timed_out());
                }
                Ok(Err(join)) => return Err(ToolError::execution(tool, join)),
                Ok(Ok(outcome)) => outcome,
            },
        };

        let report = match outcome {
            Outcome::Finished(report) => report.map_err(|reason| ToolError::execution(tool, reason))?,
            Outcome::TimedOut => return Err(timed_out()),
            Outcome::Cancelled => return Err(ToolError::Cancelled(tool.to_string())),
        };

        for line in &report.logs {
            match line.level.as_str() {
                "error" => error!(target: "sandbox", tool, "{}", line.message),
                "warn" => warn!(target: "sandbox", tool, "{}", line.message),
                "debug" => debug!(target: "sandbox", tool, "{}", line.message),
                _ => info!(target: "sandbox", tool, "{}", line.message),
            }
        }
        if report.pending > 0 {
            warn!(
                tool,
                pending = report.pending,
                budget = limits.max_timer_callbacks,
                "timer budget exhausted; remaining timers dropped"
            );
        }

        Ok(report.result)
    }
}

/// How a blocking evaluation ended.
enum Outcome {
    Finished(Result<Report, String>),
    TimedOut,
    Cancelled,
}

/// Blocking part: drive the interpreter on a private runtime until it
/// finishes, the deadline passes, or `cancel` fires.
///
/// The interpreter yields every [`STEP_BUDGET`] steps, so dropping its
/// future stops the script and frees this thread.
fn evaluate_until(
    setup: &str,
    script: &str,
    limits: SandboxLimits,
    deadline: Instant,
    cancel: &CancellationToken,
) -> Outcome {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => return Outcome::Finished(Err(format!("sandbox runtime failed: {e}"))),
    };

    runtime.block_on(async {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Outcome::Cancelled,
            _ = tokio::time::sleep_until(deadline) => Outcome::TimedOut,
            report = evaluate(setup, script, limits) => Outcome::Finished(report),
        }
    })
}

/// Build a context, install globals, run the script, drain timers.
async fn evaluate(setup: &str, script: &str, limits: SandboxLimits) -> Result<Report, String> {
    let mut ctx = Context::default();
    ctx.runtime_limits_mut()
        .set_loop_iteration_limit(limits.loop_iteration_limit);
    ctx.runtime_limits_mut()
        .set_recursion_limit(limits.recursion_limit);

    let bootstrap = format!("{PRELUDE}({setup})");
    let finish = ctx
        .eval(Source::from_bytes(&bootstrap))
        .map_err(|e| format!("sandbox setup failed: {e}"))?;
    if !finish.is_callable() {
        return Err("sandbox setup did not produce a function".into());
    }

    let completion = run_stepped(&mut ctx, script).await?;

    // Timer callbacks are untrusted too, so the drain runs stepped as well.
    let global = ctx.global_object();
    global
        .set(js_string!("__sandboxFinish"), finish, false, &mut ctx)
        .map_err(|e| e.to_string())?;
    global
        .set(js_string!("__sandboxCompletion"), completion, false, &mut ctx)
        .map_err(|e| e.to_string())?;
    let drain = format!(
        "__sandboxFinish(__sandboxCompletion, {})",
        limits.max_timer_callbacks
    );
    let report = run_stepped(&mut ctx, &drain).await?;

    let text = report
        .to_string(&mut ctx)
        .map_err(|e| e.to_string())?
        .to_std_string_escaped();

    serde_json::from_str(&text).map_err(|e| format!("result is not JSON-serializable: {e}"))
}

async fn run_stepped(ctx: &mut Context, source: &str) -> Result<JsValue, String> {
    let script = Script::parse(Source::from_bytes(source), None, ctx).map_err(|e| e.to_string())?;
    script
        .evaluate_async_with_budget(ctx, STEP_BUDGET)
        .await
        .map_err(|e| e.to_string())
}
