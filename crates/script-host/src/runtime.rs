//! Script execution: the line loop, its frame stack and the idle phase

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use threadscript_protocol::{TaskField, TaskId, WsStatus};

use crate::eval::{parse_int, Condition, Locals};
use crate::parser::{Command, Program, Statement};
use crate::{HostRequest, HostResponse, ScriptConfig, ScriptError, ScriptStatus};

/// Thread-safe cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Open block on the control-flow stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    /// `while` at `start`; `parent_active` is the activity outside the loop
    Loop { start: usize, parent_active: bool },
    /// `if`, possibly followed by `else`
    Branch { parent_active: bool },
}

/// Per-task script runner
pub struct ScriptHost {
    config: ScriptConfig,
    cancellation: CancellationToken,
}

impl ScriptHost {
    pub fn new(config: ScriptConfig) -> Self {
        Self {
            config,
            cancellation: CancellationToken::new(),
        }
    }

    /// Get the cancellation token for this host
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Cancel the running script and its idle phase
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Run a script to completion, then idle until cancelled.
    ///
    /// A fatal script error is published to `task_<id>_error` and ends the
    /// line loop early; the idle phase still runs afterwards.
    pub fn run<F>(&self, task: TaskId, source: &str, host: F) -> ScriptStatus
    where
        F: Fn(HostRequest) -> HostResponse,
    {
        let program = Program::parse(source);
        tracing::debug!(task_id = task.0, lines = program.len(), "Script loaded");

        let status = self.execute(task, &program, &host);
        match &status {
            ScriptStatus::Error { message } => {
                tracing::warn!(task_id = task.0, error = %message, "Script stopped");
                host(HostRequest::SetVar {
                    key: task.key(TaskField::Error),
                    value: message.clone(),
                });
            }
            ScriptStatus::Finished => tracing::debug!(task_id = task.0, "Script finished"),
            ScriptStatus::Cancelled => tracing::debug!(task_id = task.0, "Script cancelled"),
        }

        self.idle(task, &host);
        status
    }

    /// Execute the script's lines without the trailing idle phase
    pub fn execute<F>(&self, task: TaskId, program: &Program, host: &F) -> ScriptStatus
    where
        F: Fn(HostRequest) -> HostResponse,
    {
        let mut interpreter = Interpreter {
            task,
            config: &self.config,
            host,
            locals: Locals::new(),
            frames: Vec::new(),
            active: true,
        };

        let mut pc = 0;
        while let Some(line) = program.get(pc) {
            if self.cancellation.is_cancelled() {
                return ScriptStatus::Cancelled;
            }
            interpreter.publish(TaskField::Line, line.number.to_string());

            match interpreter.step(program, pc) {
                Ok(next) => pc = next,
                Err(err) => {
                    return ScriptStatus::Error {
                        message: err.to_string(),
                    }
                }
            }
        }
        ScriptStatus::Finished
    }

    /// Stay alive until cancelled, bumping `task_<id>_heartbeat`
    fn idle<F>(&self, task: TaskId, host: &F)
    where
        F: Fn(HostRequest) -> HostResponse,
    {
        let key = task.key(TaskField::Heartbeat);
        let interval = Duration::from_millis(self.config.heartbeat_interval_ms);
        let poll = Duration::from_millis(self.config.idle_poll_ms);
        let mut last_beat = Instant::now();

        while !self.cancellation.is_cancelled() {
            if last_beat.elapsed() >= interval {
                last_beat = Instant::now();
                let beats = host(HostRequest::GetVar { key: key.clone() })
                    .into_value()
                    .and_then(|v| parse_int(&v))
                    .unwrap_or(0);
                host(HostRequest::SetVar {
                    key: key.clone(),
                    value: beats.wrapping_add(1).to_string(),
                });
            }
            thread::sleep(poll);
        }
    }
}

impl Default for ScriptHost {
    fn default() -> Self {
        Self::new(ScriptConfig::default())
    }
}

/// Mutable state of one script execution
struct Interpreter<'a, F> {
    task: TaskId,
    config: &'a ScriptConfig,
    host: &'a F,
    locals: Locals,
    frames: Vec<Frame>,
    /// Whether the current block executes side effects
    active: bool,
}

impl<F> Interpreter<'_, F>
where
    F: Fn(HostRequest) -> HostResponse,
{
    /// Execute the line at `pc` and return the next program counter
    fn step(&mut self, program: &Program, pc: usize) -> Result<usize, ScriptError> {
        let Some(line) = program.get(pc) else {
            return Ok(pc + 1);
        };

        match &line.statement {
            Statement::While(cond) => {
                if !self.active {
                    self.frames.push(Frame::Loop { start: pc, parent_active: false });
                    return Ok(pc + 1);
                }
                if cond.eval(&self.locals) {
                    self.frames.push(Frame::Loop { start: pc, parent_active: true });
                    return Ok(pc + 1);
                }
                Ok(program.matching_end(pc).map_or(program.len(), |end| end + 1))
            }
            Statement::End => Ok(self.close_block(program, pc)),
            Statement::If(cond) => {
                let parent_active = self.active;
                self.frames.push(Frame::Branch { parent_active });
                self.active = parent_active && cond.eval(&self.locals);
                Ok(pc + 1)
            }
            Statement::Else => match self.frames.last() {
                Some(Frame::Branch { parent_active }) => {
                    self.active = *parent_active && !self.active;
                    Ok(pc + 1)
                }
                _ => Err(ScriptError::ElseWithoutIf),
            },
            _ if !self.active => Ok(pc + 1),
            Statement::Call(command) => {
                self.call(command);
                Ok(pc + 1)
            }
            Statement::Increment(name) => {
                let value = self.locals.entry(name.clone()).or_insert(0);
                *value = value.wrapping_add(1);
                Ok(pc + 1)
            }
            Statement::Assign { name, value } => {
                if let Some(value) = value {
                    self.locals.insert(name.clone(), *value);
                }
                Ok(pc + 1)
            }
            Statement::Fail(err) => Err(err.clone()),
            Statement::Nop => {
                thread::sleep(Duration::from_millis(self.config.unmatched_line_yield_ms));
                Ok(pc + 1)
            }
        }
    }

    /// Handle `end`: repeat or pop a loop, or close a branch
    fn close_block(&mut self, program: &Program, pc: usize) -> usize {
        match self.frames.last().copied() {
            None => {
                self.active = true;
                pc + 1
            }
            Some(Frame::Branch { parent_active }) => {
                self.frames.pop();
                self.active = parent_active;
                pc + 1
            }
            Some(Frame::Loop { start, parent_active }) => {
                let repeat = parent_active
                    && loop_condition(program, start).is_some_and(|c| c.eval(&self.locals));
                if repeat {
                    self.active = true;
                    start + 1
                } else {
                    self.frames.pop();
                    self.active = parent_active;
                    pc + 1
                }
            }
        }
    }

    fn call(&mut self, command: &Command) {
        match command {
            Command::WsConnect { url } => {
                let status = if self.request(HostRequest::WsConnect { url: url.clone() }).is_ok() {
                    WsStatus::Connected
                } else {
                    WsStatus::Failed
                };
                self.publish(TaskField::WsStatus, status.as_str());
            }
            Command::WsSend { message } => {
                self.request(HostRequest::WsSend { message: message.clone() });
                self.publish(TaskField::WsLastSent, message.clone());
            }
            Command::WsReceive => {
                if let Some(message) = self.request(HostRequest::WsReceive).into_value() {
                    self.publish(TaskField::WsLastReceived, message);
                }
            }
            Command::WsDisconnect => {
                self.request(HostRequest::WsDisconnect);
                self.publish(TaskField::WsStatus, WsStatus::Disconnected.as_str());
            }
            Command::SetVar { key, value } => {
                self.request(HostRequest::SetVar {
                    key: key.clone(),
                    value: value.clone(),
                });
            }
            Command::GetVar { key } => {
                let value = self
                    .request(HostRequest::GetVar { key: key.clone() })
                    .into_value()
                    .unwrap_or_default();
                self.publish(TaskField::LastGet, value);
            }
            Command::Sleep { ms } => thread::sleep(Duration::from_millis(*ms)),
        }
    }

    fn request(&self, request: HostRequest) -> HostResponse {
        (self.host)(request)
    }

    fn publish(&self, field: TaskField, value: impl Into<String>) {
        self.request(HostRequest::SetVar {
            key: self.task.key(field),
            value: value.into(),
        });
    }
}

fn loop_condition(program: &Program, start: usize) -> Option<&Condition> {
    match &program.get(start)?.statement {
        Statement::While(cond) => Some(cond),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    /// In-memory host that records store writes and serves a fake socket
    #[derive(Default)]
    struct RecordingHost {
        vars: Mutex<HashMap<String, String>>,
        inbound: Mutex<VecDeque<String>>,
        requests: Mutex<Vec<HostRequest>>,
        refuse_connect: bool,
    }

    impl RecordingHost {
        fn handle(&self, request: HostRequest) -> HostResponse {
            self.requests.lock().unwrap().push(request.clone());
            match request {
                HostRequest::SetVar { key, value } => {
                    self.vars.lock().unwrap().insert(key, value);
                    HostResponse::Ok
                }
                HostRequest::GetVar { key } => {
                    HostResponse::Value(self.vars.lock().unwrap().get(&key).cloned())
                }
                HostRequest::WsConnect { .. } if self.refuse_connect => {
                    HostResponse::Error("refused".into())
                }
                HostRequest::WsReceive => {
                    HostResponse::Value(self.inbound.lock().unwrap().pop_front())
                }
                HostRequest::WsConnect { .. }
                | HostRequest::WsSend { .. }
                | HostRequest::WsDisconnect => HostResponse::Ok,
            }
        }

        fn var(&self, key: &str) -> Option<String> {
            self.vars.lock().unwrap().get(key).cloned()
        }
    }

    fn execute(source: &str) -> (ScriptStatus, RecordingHost) {
        execute_with(source, RecordingHost::default())
    }

    fn execute_with(source: &str, recorder: RecordingHost) -> (ScriptStatus, RecordingHost) {
        let host = ScriptHost::default();
        let program = Program::parse(source);
        let status = host.execute(TaskId(1), &program, &|req| recorder.handle(req));
        (status, recorder)
    }

    #[test]
    fn if_else_takes_true_branch() {
        let (status, rec) = execute(
            "x := 5\nif x >= 3\nSetVar(\"r\",\"yes\")\nelse\nSetVar(\"r\",\"no\")\nend",
        );
        assert_eq!(status, ScriptStatus::Finished);
        assert_eq!(rec.var("r").as_deref(), Some("yes"));
    }

    #[test]
    fn if_else_takes_false_branch() {
        let (_, rec) = execute("x := 1\nif x >= 3\nSetVar(\"r\",\"yes\")\nelse\nSetVar(\"r\",\"no\")\nend");
        assert_eq!(rec.var("r").as_deref(), Some("no"));
    }

    #[test]
    fn while_loop_repeats_until_false() {
        let (status, rec) = execute(
            "i := 0\nwhile i < 25\ni++\nend\nif i == 25\nSetVar(\"done\",\"25\")\nend",
        );
        assert_eq!(status, ScriptStatus::Finished);
        assert_eq!(rec.var("done").as_deref(), Some("25"));
    }

    #[test]
    fn nested_loops_with_branches() {
        let script = "\
outer := 0
hits := 0
while outer < 3
  inner := 0
  while inner < 4
    if inner == 2
      hits++
    end
    inner++
  end
  outer++
end
if hits == 3
  SetVar(\"nested\",\"ok\")
end";
        let (status, rec) = execute(script);
        assert_eq!(status, ScriptStatus::Finished);
        assert_eq!(rec.var("nested").as_deref(), Some("ok"));
    }

    #[test]
    fn false_loop_skips_body_including_inner_blocks() {
        let script = "\
while 0
  if 1
    SetVar(\"a\",\"bad\")
  end
  SetVar(\"b\",\"bad\")
end
SetVar(\"after\",\"ok\")";
        let (_, rec) = execute(script);
        assert_eq!(rec.var("a"), None);
        assert_eq!(rec.var("b"), None);
        assert_eq!(rec.var("after").as_deref(), Some("ok"));
    }

    #[test]
    fn loop_inside_inactive_branch_does_not_run() {
        let script = "\
if 0
  while 1
    SetVar(\"x\",\"bad\")
  end
else
  SetVar(\"x\",\"good\")
end";
        let (status, rec) = execute(script);
        assert_eq!(status, ScriptStatus::Finished);
        assert_eq!(rec.var("x").as_deref(), Some("good"));
    }

    #[test]
    fn else_without_if_is_fatal() {
        let (status, rec) = execute("SetVar(\"a\",\"1\")\nelse\nSetVar(\"b\",\"2\")");
        assert_eq!(
            status,
            ScriptStatus::Error {
                message: "else without if".into()
            }
        );
        assert_eq!(rec.var("a").as_deref(), Some("1"));
        assert_eq!(rec.var("b"), None);
    }

    #[test]
    fn unsupported_function_only_fails_when_active() {
        let (status, _) = execute("if 0\nMsgBox(\"hi\")\nend");
        assert_eq!(status, ScriptStatus::Finished);

        let (status, _) = execute("MsgBox(\"hi\")");
        assert!(matches!(status, ScriptStatus::Error { message } if message.contains("MsgBox")));
    }

    #[test]
    fn missing_thread_set_var_argument_is_fatal() {
        let (status, _) = execute("ThreadSetVar(\"only\")");
        assert_eq!(
            status,
            ScriptStatus::Error {
                message: "ThreadSetVar requires 2 args".into()
            }
        );
    }

    #[test]
    fn publishes_line_numbers_and_last_get() {
        let recorder = RecordingHost::default();
        recorder.vars.lock().unwrap().insert("shared".into(), "value".into());
        let (_, rec) = execute_with("; header\nx := 1\nThreadGetVar(\"shared\")", recorder);
        assert_eq!(rec.var("task_1_line").as_deref(), Some("2"));
        assert_eq!(rec.var("task_1_last_get").as_deref(), Some("value"));
    }

    #[test]
    fn websocket_commands_publish_status() {
        let recorder = RecordingHost::default();
        recorder.inbound.lock().unwrap().push_back("pong".into());
        let script = "\
WebSocketConnect(\"ws://localhost:8080\")
WebSocketSend(\"ping\")
WebSocketReceive()
WebSocketReceive()";
        let (_, rec) = execute_with(script, recorder);
        assert_eq!(rec.var("task_1_ws_status").as_deref(), Some("connected"));
        assert_eq!(rec.var("task_1_ws_last_sent").as_deref(), Some("ping"));
        assert_eq!(rec.var("task_1_ws_last_received").as_deref(), Some("pong"));

        let (_, rec) = execute_with("WebSocketDisconnect()", RecordingHost::default());
        assert_eq!(rec.var("task_1_ws_status").as_deref(), Some("disconnected"));
    }

    #[test]
    fn failed_connect_publishes_failed() {
        let recorder = RecordingHost {
            refuse_connect: true,
            ..Default::default()
        };
        let (_, rec) = execute_with("WebSocketConnect(\"ws://nowhere\")", recorder);
        assert_eq!(rec.var("task_1_ws_status").as_deref(), Some("failed"));
        let requests = rec.requests.lock().unwrap();
        assert!(requests.contains(&HostRequest::WsConnect {
            url: "ws://nowhere".into()
        }));
    }

    #[test]
    fn cancelled_before_start_runs_nothing() {
        let host = ScriptHost::default();
        host.cancel();
        let recorder = RecordingHost::default();
        let program = Program::parse("SetVar(\"a\",\"1\")");
        let status = host.execute(TaskId(3), &program, &|req| recorder.handle(req));
        assert_eq!(status, ScriptStatus::Cancelled);
        assert_eq!(recorder.var("a"), None);
    }

    #[test]
    fn run_idles_with_heartbeat_until_cancelled() {
        let host = Arc::new(ScriptHost::default());
        let recorder = Arc::new(RecordingHost::default());

        let worker = {
            let host = host.clone();
            let recorder = recorder.clone();
            thread::spawn(move || host.run(TaskId(9), "Foo()", |req| recorder.handle(req)))
        };

        let deadline = Instant::now() + Duration::from_secs(5);
        while recorder.var("task_9_heartbeat").is_none() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        host.cancel();
        let status = worker.join().unwrap();

        assert!(matches!(status, ScriptStatus::Error { .. }));
        assert_eq!(recorder.var("task_9_error").as_deref(), Some("Unsupported function: Foo()"));
        let beats: i64 = recorder.var("task_9_heartbeat").unwrap().parse().unwrap();
        assert!(beats >= 1);
    }

    #[test]
    fn cancellation_token() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }
}
