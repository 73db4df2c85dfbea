//! A scripted, in-memory [`Runtime`] for driving the pipeline without a
//! real interpreter.
//!
//! The fake understands exactly the calls the pipeline makes: staging and
//! calling the preparation module, running the entry file, `dump_json`, and
//! the artifact listing snippet. Everything else raises.
#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};

use pyrun::{
    Argument, Error, HostEvents, Interpreter, LIST_ARTIFACTS_PY, LogLevel, Logger, PyObject,
    RaisedError, Runtime, SourceFile,
};

/// A traceback as the interpreter reports it, including one of its own
/// bootstrap frames.
pub const RAW_TRACEBACK: &str = "Traceback (most recent call last):\n  File \"/lib/python312.zip/_pyodide/_base.py\", line 597, in eval_code_async\n    await CodeRunner(\n  File \"main.py\", line 2, in <module>\nValueError: bad input\n";

/// [`RAW_TRACEBACK`] after sanitization.
pub const CLEAN_TRACEBACK: &str =
    "Traceback (most recent call last):\n  File \"main.py\", line 2, in <module>\nValueError: bad input\n";

/// A value held in the fake interpreter's object table.
#[derive(Debug, Clone, PartialEq)]
pub enum FakeValue {
    /// Python `None`.
    None,
    /// Plain data.
    Data(Value),
    /// Something with no JSON form, like a module or an open file.
    Opaque,
}

/// What `prepare_env` does when called.
#[derive(Debug, Clone)]
pub enum PrepareBehavior {
    /// Return this value.
    Reply(Value),
    /// Raise with this traceback.
    Raise(String),
}

impl PrepareBehavior {
    pub fn success(dependencies: &[&str]) -> Self {
        Self::Reply(json!({"kind": "success", "dependencies": dependencies}))
    }

    pub fn error(message: &str) -> Self {
        Self::Reply(json!({"kind": "error", "message": message}))
    }
}

/// The user program's view of the sandbox while it runs.
pub struct Program<'a> {
    events: &'a dyn HostEvents,
    cwd: &'a mut BTreeMap<String, Vec<u8>>,
}

impl Program<'_> {
    pub fn print(&mut self, line: &str) {
        self.events.stdout(line);
    }

    pub fn eprint(&mut self, line: &str) {
        self.events.stderr(line);
    }

    pub fn debug(&mut self, message: &str) {
        self.events.debug_print(message);
    }

    pub fn write(&mut self, name: &str, contents: &[u8]) {
        self.cwd.insert(name.to_string(), contents.to_vec());
    }
}

type ProgramFn = dyn Fn(&mut Program<'_>) -> Result<FakeValue, String> + Send + Sync;

/// Everything the fake observed, shared across instances of one runtime.
#[derive(Debug, Default)]
pub struct Record {
    pub instances: usize,
    pub loaded_packages: Vec<Vec<String>>,
    pub staged: BTreeMap<String, Vec<u8>>,
    pub sys_path: Vec<String>,
    pub prepared_files: Vec<SourceFile>,
    pub executed: Vec<String>,
    pub flushes: usize,
}

/// Builder-style scripted runtime.
#[derive(Clone)]
pub struct ScriptedRuntime {
    base_packages_error: Option<String>,
    install_progress: Vec<String>,
    install_errors: Vec<String>,
    prepare: PrepareBehavior,
    program: Arc<ProgramFn>,
    listing_raises: bool,
    record: Arc<Mutex<Record>>,
}

impl Default for ScriptedRuntime {
    fn default() -> Self {
        Self {
            base_packages_error: None,
            install_progress: Vec::new(),
            install_errors: Vec::new(),
            prepare: PrepareBehavior::success(&[]),
            program: Arc::new(|_| Ok(FakeValue::None)),
            listing_raises: false,
            record: Arc::default(),
        }
    }
}

impl ScriptedRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_base_packages(mut self, message: &str) -> Self {
        self.base_packages_error = Some(message.to_string());
        self
    }

    pub fn install_progress(mut self, message: &str) -> Self {
        self.install_progress.push(message.to_string());
        self
    }

    pub fn install_error(mut self, message: &str) -> Self {
        self.install_errors.push(message.to_string());
        self
    }

    pub fn prepare(mut self, behavior: PrepareBehavior) -> Self {
        self.prepare = behavior;
        self
    }

    pub fn program(
        mut self,
        program: impl Fn(&mut Program<'_>) -> Result<FakeValue, String> + Send + Sync + 'static,
    ) -> Self {
        self.program = Arc::new(program);
        self
    }

    pub fn listing_raises(mut self) -> Self {
        self.listing_raises = true;
        self
    }

    pub fn record(&self) -> Arc<Mutex<Record>> {
        self.record.clone()
    }
}

#[async_trait]
impl Runtime for ScriptedRuntime {
    async fn instantiate(&self, events: Arc<dyn HostEvents>) -> Result<Box<dyn Interpreter>, Error> {
        self.record.lock().unwrap().instances += 1;
        Ok(Box::new(ScriptedInterpreter {
            script: self.clone(),
            events,
            objects: Vec::new(),
            cwd: BTreeMap::new(),
        }))
    }
}

struct ScriptedInterpreter {
    script: ScriptedRuntime,
    events: Arc<dyn HostEvents>,
    objects: Vec<FakeValue>,
    cwd: BTreeMap<String, Vec<u8>>,
}

impl ScriptedInterpreter {
    fn alloc(&mut self, value: FakeValue) -> PyObject {
        self.objects.push(value);
        PyObject(u32::try_from(self.objects.len() - 1).unwrap())
    }

    fn get(&self, object: PyObject) -> Result<FakeValue, RaisedError> {
        self.objects
            .get(object.0 as usize)
            .cloned()
            .ok_or_else(|| RaisedError::python(format!("KeyError: no object {}", object.0)))
    }

    fn module_is_importable(&self, module: &str) -> bool {
        let record = self.script.record.lock().unwrap();
        record.sys_path.iter().any(|dir| {
            let path = format!("{}/{module}.py", dir.trim_end_matches('/'));
            record.staged.contains_key(&path)
        })
    }

    /// Lists the working directory without filtering, so host-side
    /// exclusion is what keeps sources and dot-files out.
    fn listing(&self) -> FakeValue {
        let entries: Vec<Value> = self
            .cwd
            .iter()
            .map(|(name, content)| json!({"name": name, "size": content.len(), "content": content}))
            .collect();
        FakeValue::Data(Value::String(Value::Array(entries).to_string()))
    }

    fn prepare_env(&mut self, args: Vec<Argument>) -> Result<PyObject, RaisedError> {
        let [Argument::Json(files)] = args.as_slice() else {
            return Err(RaisedError::python("TypeError: prepare_env() takes 1 argument"));
        };
        let files: Vec<SourceFile> = serde_json::from_value(files.clone())
            .map_err(|e| RaisedError::python(format!("TypeError: {e}")))?;

        for file in &files {
            self.cwd
                .insert(file.name.clone(), file.content.clone().into_bytes());
        }
        self.script.record.lock().unwrap().prepared_files = files;

        match self.script.prepare.clone() {
            PrepareBehavior::Reply(reply) => Ok(self.alloc(FakeValue::Data(reply))),
            PrepareBehavior::Raise(traceback) => Err(RaisedError::python(traceback)),
        }
    }

    fn dump_json(&mut self, args: Vec<Argument>) -> Result<PyObject, RaisedError> {
        let [Argument::Object(object)] = args.as_slice() else {
            return Err(RaisedError::python("TypeError: dump_json() takes 1 argument"));
        };
        let dumped = match self.get(*object)? {
            FakeValue::None | FakeValue::Opaque => FakeValue::None,
            FakeValue::Data(Value::String(s)) => FakeValue::Data(Value::String(s)),
            FakeValue::Data(value) => {
                FakeValue::Data(Value::String(serde_json::to_string_pretty(&value).unwrap()))
            }
        };
        Ok(self.alloc(dumped))
    }
}

#[async_trait]
impl Interpreter for ScriptedInterpreter {
    async fn load_packages(&mut self, names: &[String]) -> Result<(), String> {
        self.script
            .record
            .lock()
            .unwrap()
            .loaded_packages
            .push(names.to_vec());

        for message in &self.script.install_progress {
            self.events.package_progress(message);
        }
        for message in &self.script.install_errors {
            self.events.package_error(message);
        }
        match &self.script.base_packages_error {
            Some(message) => {
                self.events.package_error(message);
                Err(message.clone())
            }
            None => Ok(()),
        }
    }

    async fn write_file(&mut self, path: &str, contents: &[u8]) -> Result<(), RaisedError> {
        let mut record = self.script.record.lock().unwrap();
        record.staged.insert(path.to_string(), contents.to_vec());
        Ok(())
    }

    async fn append_sys_path(&mut self, dir: &str) -> Result<(), RaisedError> {
        self.script.record.lock().unwrap().sys_path.push(dir.to_string());
        Ok(())
    }

    async fn run(&mut self, code: &str, filename: &str) -> Result<PyObject, RaisedError> {
        if code == LIST_ARTIFACTS_PY {
            if self.script.listing_raises {
                return Err(RaisedError::python("PermissionError: [Errno 13] denied"));
            }
            let listing = self.listing();
            return Ok(self.alloc(listing));
        }

        self.script
            .record
            .lock()
            .unwrap()
            .executed
            .push(filename.to_string());

        let program = self.script.program.clone();
        let events = self.events.clone();
        let mut view = Program {
            events: events.as_ref(),
            cwd: &mut self.cwd,
        };
        match program(&mut view) {
            Ok(value) => Ok(self.alloc(value)),
            Err(traceback) => Err(RaisedError::python(traceback)),
        }
    }

    async fn call(
        &mut self,
        module: &str,
        function: &str,
        args: Vec<Argument>,
    ) -> Result<PyObject, RaisedError> {
        if !self.module_is_importable(module) {
            return Err(RaisedError::python(format!(
                "ModuleNotFoundError: No module named '{module}'"
            )));
        }
        match function {
            "prepare_env" => self.prepare_env(args),
            "dump_json" => self.dump_json(args),
            other => Err(RaisedError::python(format!(
                "AttributeError: module '{module}' has no attribute '{other}'"
            ))),
        }
    }

    async fn to_json(&mut self, object: PyObject) -> Result<Value, RaisedError> {
        match self.get(object)? {
            FakeValue::None => Ok(Value::Null),
            FakeValue::Data(value) => Ok(value),
            FakeValue::Opaque => Err(RaisedError::python(
                "TypeError: Object of type module is not JSON serializable",
            )),
        }
    }

    async fn flush(&mut self) {
        self.script.record.lock().unwrap().flushes += 1;
    }
}

/// A [`Logger`] that keeps every message.
#[derive(Debug, Default)]
pub struct RecordingLogger {
    messages: Mutex<Vec<(LogLevel, String)>>,
}

impl RecordingLogger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn messages(&self) -> Vec<(LogLevel, String)> {
        self.messages.lock().unwrap().clone()
    }

    pub fn at(&self, level: LogLevel) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m)
            .collect()
    }
}

impl Logger for RecordingLogger {
    fn log(&self, level: LogLevel, message: &str) {
        self.messages
            .lock()
            .unwrap()
            .push((level, message.to_string()));
    }
}
