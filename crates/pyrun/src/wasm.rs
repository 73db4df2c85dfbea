//! WebAssembly runtime setup and WIT bindings.
//!
//! This module hosts a Python interpreter compiled to a WebAssembly component
//! implementing the `pyrun:sandbox` world (see `wit/sandbox.wit`). Each
//! instance gets its own store and its own temporary directory mounted as the
//! guest's root filesystem, so nothing a program writes outlives its run.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;
use wasmtime::component::{Component, HasSelf, Linker, ResourceTable};
use wasmtime::{Config, Engine, Store};
use wasmtime_wasi::{DirPerms, FilePerms, WasiCtx, WasiCtxBuilder, WasiCtxView, WasiView};

use crate::error::Error;
use crate::interpreter::{Argument, HostEvents, Interpreter, PyObject, RaisedError, Runtime};

wasmtime::component::bindgen!({
    path: "wit",
    world: "interpreter-sandbox",
    exports: { default: async },
});

use exports::pyrun::sandbox::interpreter as guest;
use self::pyrun::sandbox::host::{self, OutputChannel};

/// Guest path of the working directory inside the private filesystem.
const GUEST_HOME: &str = "/home/sandbox";

/// Guest mount point for the Python standard library.
const GUEST_STDLIB: &str = "/python-stdlib";

/// Guest mount point for pre-downloaded packages.
const GUEST_SITE_PACKAGES: &str = "/site-packages";

/// State for a single interpreter instance.
struct HostState {
    /// WASI context for the instance.
    wasi: WasiCtx,
    /// Resource table for WASI.
    table: ResourceTable,
    /// Where stream lines and diagnostics are delivered.
    events: Arc<dyn HostEvents>,
    /// Backing directory of the guest's root filesystem; removed on drop.
    _root: TempDir,
}

impl std::fmt::Debug for HostState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostState")
            .field("root", &self._root.path())
            .finish_non_exhaustive()
    }
}

impl WasiView for HostState {
    fn ctx(&mut self) -> WasiCtxView<'_> {
        WasiCtxView {
            ctx: &mut self.wasi,
            table: &mut self.table,
        }
    }
}

impl host::Host for HostState {
    fn write_line(&mut self, channel: OutputChannel, line: String) {
        match channel {
            OutputChannel::Stdout => self.events.stdout(&line),
            OutputChannel::Stderr => self.events.stderr(&line),
        }
    }

    fn debug_print(&mut self, message: String) {
        self.events.debug_print(&message);
    }

    fn package_progress(&mut self, message: String) {
        self.events.package_progress(&message);
    }

    fn package_error(&mut self, message: String) {
        self.events.package_error(&message);
    }
}

/// A [`Runtime`] backed by a Python interpreter WebAssembly component.
pub struct WasmRuntime {
    engine: Engine,
    component: Component,
    linker: Linker<HostState>,
    python_stdlib: Option<PathBuf>,
    site_packages: Option<PathBuf>,
}

impl std::fmt::Debug for WasmRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmRuntime")
            .field("engine", &"<wasmtime::Engine>")
            .field("component", &"<wasmtime::Component>")
            .field("python_stdlib", &self.python_stdlib)
            .field("site_packages", &self.site_packages)
            .finish_non_exhaustive()
    }
}

impl WasmRuntime {
    /// Load the interpreter component from bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the component cannot be loaded or the wasmtime
    /// engine cannot be configured.
    pub fn from_binary(wasm_bytes: &[u8]) -> Result<Self, Error> {
        let engine = Self::create_engine()?;
        let component = Component::from_binary(&engine, wasm_bytes).map_err(Error::WasmComponent)?;
        let linker = Self::create_linker(&engine)?;

        Ok(Self {
            engine,
            component,
            linker,
            python_stdlib: None,
            site_packages: None,
        })
    }

    /// Load the interpreter component from a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the component cannot
    /// be loaded.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let engine = Self::create_engine()?;
        let component =
            Component::from_file(&engine, path.as_ref()).map_err(Error::WasmComponent)?;
        let linker = Self::create_linker(&engine)?;

        Ok(Self {
            engine,
            component,
            linker,
            python_stdlib: None,
            site_packages: None,
        })
    }

    /// Mount a host copy of the Python standard library, read-only.
    #[must_use]
    pub fn with_python_stdlib(mut self, path: impl Into<PathBuf>) -> Self {
        self.python_stdlib = Some(path.into());
        self
    }

    /// Mount a host directory of installable packages, read-only.
    #[must_use]
    pub fn with_site_packages(mut self, path: impl Into<PathBuf>) -> Self {
        self.site_packages = Some(path.into());
        self
    }

    fn create_engine() -> Result<Engine, Error> {
        let mut config = Config::new();
        config.wasm_component_model(true);
        config.async_support(true);

        Engine::new(&config).map_err(|e| Error::WasmEngine(e.to_string()))
    }

    fn create_linker(engine: &Engine) -> Result<Linker<HostState>, Error> {
        let mut linker = Linker::<HostState>::new(engine);

        wasmtime_wasi::p2::add_to_linker_async(&mut linker)
            .map_err(|e| Error::WasmEngine(format!("Failed to add WASI to linker: {e}")))?;

        InterpreterSandbox::add_to_linker::<_, HasSelf<HostState>>(&mut linker, |state| state)
            .map_err(|e| Error::WasmEngine(format!("Failed to add host to linker: {e}")))?;

        Ok(linker)
    }

    fn build_wasi(&self, root: &TempDir) -> Result<WasiCtx, Error> {
        let home = root.path().join(GUEST_HOME.trim_start_matches('/'));
        std::fs::create_dir_all(&home)
            .map_err(|e| Error::Initialization(format!("Failed to create home directory: {e}")))?;

        let mut builder = WasiCtxBuilder::new();
        builder
            .env("HOME", GUEST_HOME)
            .env("PWD", GUEST_HOME)
            .preopened_dir(root.path(), "/", DirPerms::all(), FilePerms::all())
            .map_err(|e| Error::Initialization(format!("Failed to mount sandbox root: {e}")))?;

        if let Some(stdlib) = &self.python_stdlib {
            builder
                .env("PYTHONHOME", GUEST_STDLIB)
                .preopened_dir(stdlib, GUEST_STDLIB, DirPerms::READ, FilePerms::READ)
                .map_err(|e| Error::Initialization(format!("Failed to mount stdlib: {e}")))?;
        }
        if let Some(site_packages) = &self.site_packages {
            builder
                .preopened_dir(
                    site_packages,
                    GUEST_SITE_PACKAGES,
                    DirPerms::READ,
                    FilePerms::READ,
                )
                .map_err(|e| {
                    Error::Initialization(format!("Failed to mount site-packages: {e}"))
                })?;
        }

        Ok(builder.build())
    }
}

#[async_trait]
impl Runtime for WasmRuntime {
    async fn instantiate(&self, events: Arc<dyn HostEvents>) -> Result<Box<dyn Interpreter>, Error> {
        let root = tempfile::Builder::new()
            .prefix("pyrun-")
            .tempdir()
            .map_err(|e| Error::Initialization(format!("Failed to create sandbox root: {e}")))?;
        let wasi = self.build_wasi(&root)?;

        tracing::debug!(root = %root.path().display(), "Instantiating interpreter component");
        let state = HostState {
            wasi,
            table: ResourceTable::new(),
            events,
            _root: root,
        };
        let mut store = Store::new(&self.engine, state);

        let bindings = InterpreterSandbox::instantiate_async(&mut store, &self.component, &self.linker)
            .await
            .map_err(|e| Error::Initialization(format!("Failed to instantiate component: {e}")))?;

        Ok(Box::new(WasmInterpreter { store, bindings }))
    }
}

/// One instantiated interpreter component.
struct WasmInterpreter {
    store: Store<HostState>,
    bindings: InterpreterSandbox,
}

fn trap(err: wasmtime::Error) -> RaisedError {
    RaisedError::new(RaisedError::TRAP, format!("{err:?}"))
}

impl From<guest::Raised> for RaisedError {
    fn from(raised: guest::Raised) -> Self {
        Self::new(raised.kind, raised.message)
    }
}

impl From<Argument> for guest::Argument {
    fn from(arg: Argument) -> Self {
        match arg {
            Argument::Json(value) => Self::Json(value.to_string()),
            Argument::Object(PyObject(id)) => Self::Object(id),
        }
    }
}

#[async_trait]
impl Interpreter for WasmInterpreter {
    async fn load_packages(&mut self, names: &[String]) -> Result<(), String> {
        let guest = self.bindings.pyrun_sandbox_interpreter();
        guest
            .call_load_packages(&mut self.store, names)
            .await
            .map_err(|e| format!("{e:?}"))?
    }

    async fn write_file(&mut self, path: &str, contents: &[u8]) -> Result<(), RaisedError> {
        let guest = self.bindings.pyrun_sandbox_interpreter();
        guest
            .call_write_file(&mut self.store, path, contents)
            .await
            .map_err(trap)?
            .map_err(RaisedError::from)
    }

    async fn append_sys_path(&mut self, dir: &str) -> Result<(), RaisedError> {
        let guest = self.bindings.pyrun_sandbox_interpreter();
        guest
            .call_append_sys_path(&mut self.store, dir)
            .await
            .map_err(trap)?
            .map_err(RaisedError::from)
    }

    async fn run(&mut self, code: &str, filename: &str) -> Result<PyObject, RaisedError> {
        let guest = self.bindings.pyrun_sandbox_interpreter();
        guest
            .call_run(&mut self.store, code, filename)
            .await
            .map_err(trap)?
            .map(PyObject)
            .map_err(RaisedError::from)
    }

    async fn call(
        &mut self,
        module: &str,
        function: &str,
        args: Vec<Argument>,
    ) -> Result<PyObject, RaisedError> {
        let args: Vec<guest::Argument> = args.into_iter().map(Into::into).collect();
        let guest = self.bindings.pyrun_sandbox_interpreter();
        guest
            .call_call(&mut self.store, module, function, &args)
            .await
            .map_err(trap)?
            .map(PyObject)
            .map_err(RaisedError::from)
    }

    async fn to_json(&mut self, object: PyObject) -> Result<serde_json::Value, RaisedError> {
        let guest = self.bindings.pyrun_sandbox_interpreter();
        let json = guest
            .call_to_json(&mut self.store, object.0)
            .await
            .map_err(trap)?
            .map_err(RaisedError::from)?;
        serde_json::from_str(&json)
            .map_err(|e| RaisedError::new("ProtocolError", format!("guest returned invalid JSON: {e}")))
    }

    async fn flush(&mut self) {
        let guest = self.bindings.pyrun_sandbox_interpreter();
        if let Err(err) = guest.call_flush(&mut self.store).await {
            tracing::warn!(error = ?err, "Failed to flush sandbox streams");
        }
    }
}
