//! Runtime library hosting
//!
//! Loads the runtime shared library, creates the hosted runtime with the
//! assembled options, and exposes it behind [`HostedRuntimeBridge`] so
//! the rest of the launcher never touches the FFI surface directly.
//! [`RuntimeFactory`] is the seam test code replaces with a fake.

use libloading::Library;
use std::ffi::{c_char, c_int, c_void, CString};
use std::path::Path;
use std::ptr;
use std::sync::{Arc, Mutex, OnceLock};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("Could not load runtime library '{path}': {source}")]
    LibraryLoad {
        path: String,
        #[source]
        source: libloading::Error,
    },

    #[error("Runtime library is missing entry point '{0}'")]
    SymbolMissing(String),

    #[error("Runtime creation failed (code {0})")]
    CreateFailed(i32),

    #[error("Runtime invocation failed (code {0})")]
    InvokeFailed(i32),

    #[error("No entry point configured for '{0}'")]
    EntryMissing(&'static str),

    #[error("Runtime not started")]
    NotStarted,

    #[error("Invalid runtime option: {0}")]
    BadOption(String),
}

/// Result of [`VmHost::shutdown`]; calling it without a started runtime
/// is a no-op with its own status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownStatus {
    ShutDown,
    NeverStarted,
}

/// Hosted entry-point names, bound once from the configuration.
#[derive(Debug, Clone, Default)]
pub struct EntryPoints {
    pub main: Option<String>,
    pub service: Option<String>,
    pub instance: Option<String>,
}

/// Calls into the hosted runtime. Implementations must be callable from
/// any thread after the corresponding attach.
pub trait HostedRuntimeBridge: Send + Sync {
    fn invoke_main(&self, args: &[String]) -> Result<(), HostError>;
    fn invoke_service_main(&self, args: &[String]) -> Result<i32, HostError>;
    fn invoke_service_control(&self, code: u32) -> Result<i32, HostError>;
    fn invoke_activate(&self, payload: &str) -> Result<(), HostError>;
    fn invoke_execute(&self, payload: &str) -> Result<(), HostError>;
    fn attach_worker(&self) -> Result<(), HostError>;
    fn attach_daemon(&self) -> Result<(), HostError>;
    fn detach(&self) -> Result<(), HostError>;
}

/// A started runtime: hands out its bridge and shuts down once.
pub trait RuntimeSession: Send + Sync {
    fn bridge(&self) -> Arc<dyn HostedRuntimeBridge>;
    fn shutdown(&self) -> Result<ShutdownStatus, HostError>;
}

pub trait RuntimeFactory: Send + Sync {
    fn start(
        &self,
        library: &Path,
        args: &[String],
        entries: EntryPoints,
    ) -> Result<Box<dyn RuntimeSession>, HostError>;
}

/// Receives the exit notification raised by the runtime's abort/exit
/// hooks, so service status can be reported even on abnormal termination.
pub trait ShutdownNotifier: Send + Sync {
    fn notify_shutdown(&self, exit_code: i32);
}

static SHUTDOWN_NOTIFIER: OnceLock<Arc<dyn ShutdownNotifier>> = OnceLock::new();

/// Install the process-wide shutdown notifier. First installation wins;
/// later calls are ignored.
pub fn install_shutdown_notifier(notifier: Arc<dyn ShutdownNotifier>) {
    let _ = SHUTDOWN_NOTIFIER.set(notifier);
}

pub fn dispatch_shutdown(exit_code: i32) {
    if let Some(notifier) = SHUTDOWN_NOTIFIER.get() {
        notifier.notify_shutdown(exit_code);
    }
}

extern "C" fn abort_hook() {
    log::error!("Hosted runtime aborted");
    dispatch_shutdown(1);
}

extern "C" fn exit_hook(code: c_int) {
    log::info!("Hosted runtime exited with code {}", code);
    dispatch_shutdown(code);
}

// ---------------------------------------------------------------------------
// Runtime library C protocol

#[repr(C)]
pub struct RuntimeOption {
    pub option_string: *const c_char,
    pub extra_info: *mut c_void,
}

type CreateRuntimeFn = unsafe extern "C" fn(
    options: *const RuntimeOption,
    option_count: u32,
    runtime: *mut *mut c_void,
    context: *mut *mut c_void,
) -> i32;
type AttachFn =
    unsafe extern "C" fn(runtime: *mut c_void, context: *mut *mut c_void, daemon: i32) -> i32;
type DetachFn = unsafe extern "C" fn(runtime: *mut c_void) -> i32;
type DestroyFn = unsafe extern "C" fn(runtime: *mut c_void) -> i32;
type InvokeMainFn = unsafe extern "C" fn(
    context: *mut c_void,
    entry: *const c_char,
    argc: u32,
    argv: *const *const c_char,
) -> i32;
type InvokeControlFn =
    unsafe extern "C" fn(context: *mut c_void, entry: *const c_char, code: u32) -> i32;

struct LoadedVm {
    // Keeps the shared library mapped for as long as any bridge or
    // session holds the Arc; the fn pointers below point into it.
    _library: Library,
    attach: AttachFn,
    detach: DetachFn,
    destroy: DestroyFn,
    invoke_main: InvokeMainFn,
    invoke_control: InvokeControlFn,
    runtime: *mut c_void,
    main_context: *mut c_void,
}

// The runtime and context handles are owned by the hosted runtime and
// required by its protocol to be usable from any attached thread.
unsafe impl Send for LoadedVm {}
unsafe impl Sync for LoadedVm {}

thread_local! {
    // Execution context for the current thread, set by attach.
    static THREAD_CONTEXT: std::cell::Cell<*mut c_void> =
        const { std::cell::Cell::new(ptr::null_mut()) };
}

impl LoadedVm {
    fn context(&self) -> *mut c_void {
        let ctx = THREAD_CONTEXT.with(|c| c.get());
        if ctx.is_null() {
            self.main_context
        } else {
            ctx
        }
    }

    fn attach(&self, daemon: bool) -> Result<(), HostError> {
        let mut ctx: *mut c_void = ptr::null_mut();
        // Safety: runtime handle is valid until destroy, which only runs
        // after every bridge clone is gone.
        let rc = unsafe { (self.attach)(self.runtime, &mut ctx, daemon as i32) };
        if rc != 0 {
            return Err(HostError::InvokeFailed(rc));
        }
        THREAD_CONTEXT.with(|c| c.set(ctx));
        Ok(())
    }

    fn invoke(&self, entry: &CString, args: &[String]) -> Result<i32, HostError> {
        let arg_strings = args
            .iter()
            .map(|a| CString::new(a.as_str()).map_err(|_| HostError::BadOption(a.clone())))
            .collect::<Result<Vec<_>, _>>()?;
        let argv: Vec<*const c_char> = arg_strings.iter().map(|a| a.as_ptr()).collect();
        // Safety: entry and argv outlive the call; context comes from
        // create or a thread attach.
        let rc = unsafe {
            (self.invoke_main)(
                self.context(),
                entry.as_ptr(),
                argv.len() as u32,
                argv.as_ptr(),
            )
        };
        Ok(rc)
    }
}

/// Entry names arrive in dotted form and cross the FFI boundary with
/// slashes, per the runtime's internal naming.
fn entry_cstring(name: &str) -> Result<CString, HostError> {
    CString::new(name.replace('.', "/")).map_err(|_| HostError::BadOption(name.to_string()))
}

struct NativeBridge {
    vm: Arc<LoadedVm>,
    main: Option<CString>,
    service: Option<CString>,
    instance: Option<CString>,
}

impl NativeBridge {
    fn entry(
        slot: &Option<CString>,
        what: &'static str,
    ) -> Result<CString, HostError> {
        slot.clone().ok_or(HostError::EntryMissing(what))
    }
}

impl HostedRuntimeBridge for NativeBridge {
    fn invoke_main(&self, args: &[String]) -> Result<(), HostError> {
        let entry = Self::entry(&self.main, "main")?;
        match self.vm.invoke(&entry, args)? {
            0 => Ok(()),
            rc => Err(HostError::InvokeFailed(rc)),
        }
    }

    fn invoke_service_main(&self, args: &[String]) -> Result<i32, HostError> {
        let entry = Self::entry(&self.service, "service")?;
        self.vm.invoke(&entry, args)
    }

    fn invoke_service_control(&self, code: u32) -> Result<i32, HostError> {
        let entry = Self::entry(&self.service, "service")?;
        // Safety: see LoadedVm::invoke.
        let rc = unsafe { (self.vm.invoke_control)(self.vm.context(), entry.as_ptr(), code) };
        Ok(rc)
    }

    fn invoke_activate(&self, payload: &str) -> Result<(), HostError> {
        let entry = Self::entry(&self.instance, "instance")?;
        self.vm.invoke(&entry, &["activate".to_string(), payload.to_string()])?;
        Ok(())
    }

    fn invoke_execute(&self, payload: &str) -> Result<(), HostError> {
        let entry = Self::entry(&self.instance, "instance")?;
        self.vm.invoke(&entry, &["execute".to_string(), payload.to_string()])?;
        Ok(())
    }

    fn attach_worker(&self) -> Result<(), HostError> {
        self.vm.attach(false)
    }

    fn attach_daemon(&self) -> Result<(), HostError> {
        self.vm.attach(true)
    }

    fn detach(&self) -> Result<(), HostError> {
        let rc = unsafe { (self.vm.detach)(self.vm.runtime) };
        THREAD_CONTEXT.with(|c| c.set(ptr::null_mut()));
        if rc != 0 {
            return Err(HostError::InvokeFailed(rc));
        }
        Ok(())
    }
}

/// Owns the loaded runtime. Shutdown detaches, destroys the runtime and
/// drops the library mapping with the last bridge reference.
pub struct VmHost {
    vm: Mutex<Option<Arc<LoadedVm>>>,
    entries: EntryPoints,
}

impl VmHost {
    pub fn start(library_path: &Path, args: &[String], entries: EntryPoints) -> Result<Self, HostError> {
        log::info!("Loading runtime library: {}", library_path.display());
        // Safety: library initialisers are the runtime's documented
        // loading protocol.
        let library = unsafe { Library::new(library_path) }.map_err(|source| {
            HostError::LibraryLoad {
                path: library_path.display().to_string(),
                source,
            }
        })?;

        let create: CreateRuntimeFn = resolve(&library, "Runtime_Create")?;
        let attach: AttachFn = resolve(&library, "Runtime_Attach")?;
        let detach: DetachFn = resolve(&library, "Runtime_Detach")?;
        let destroy: DestroyFn = resolve(&library, "Runtime_Destroy")?;
        let invoke_main: InvokeMainFn = resolve(&library, "Runtime_InvokeMain")?;
        let invoke_control: InvokeControlFn = resolve(&library, "Runtime_InvokeControl")?;

        let option_strings = args
            .iter()
            .map(|a| CString::new(a.as_str()).map_err(|_| HostError::BadOption(a.clone())))
            .collect::<Result<Vec<_>, _>>()?;
        let mut options: Vec<RuntimeOption> = option_strings
            .iter()
            .map(|s| RuntimeOption {
                option_string: s.as_ptr(),
                extra_info: ptr::null_mut(),
            })
            .collect();

        // Two fixed hook options let the runtime call back on abnormal
        // termination before it tears itself down.
        let abort_name = CString::new("abort").map_err(|_| HostError::BadOption("abort".into()))?;
        let exit_name = CString::new("exit").map_err(|_| HostError::BadOption("exit".into()))?;
        options.push(RuntimeOption {
            option_string: abort_name.as_ptr(),
            extra_info: abort_hook as *const () as *mut c_void,
        });
        options.push(RuntimeOption {
            option_string: exit_name.as_ptr(),
            extra_info: exit_hook as *const () as *mut c_void,
        });

        let mut runtime: *mut c_void = ptr::null_mut();
        let mut context: *mut c_void = ptr::null_mut();
        // Safety: options, runtime and context pointers are valid for
        // the duration of the call; the runtime copies what it keeps.
        let rc = unsafe { create(options.as_ptr(), options.len() as u32, &mut runtime, &mut context) };
        if rc != 0 {
            return Err(HostError::CreateFailed(rc));
        }

        Ok(VmHost {
            vm: Mutex::new(Some(Arc::new(LoadedVm {
                _library: library,
                attach,
                detach,
                destroy,
                invoke_main,
                invoke_control,
                runtime,
                main_context: context,
            }))),
            entries,
        })
    }

    fn native_bridge(&self) -> Result<NativeBridge, HostError> {
        let vm = self
            .vm
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(HostError::NotStarted)?;
        Ok(NativeBridge {
            vm,
            main: self.entries.main.as_deref().map(entry_cstring).transpose()?,
            service: self.entries.service.as_deref().map(entry_cstring).transpose()?,
            instance: self.entries.instance.as_deref().map(entry_cstring).transpose()?,
        })
    }

    pub fn shutdown(&self) -> Result<ShutdownStatus, HostError> {
        let taken = self.vm.lock().unwrap_or_else(|e| e.into_inner()).take();
        let Some(vm) = taken else {
            return Ok(ShutdownStatus::NeverStarted);
        };
        // Safety: the handle is taken out of the host, so destroy runs
        // at most once.
        unsafe {
            (vm.detach)(vm.runtime);
            (vm.destroy)(vm.runtime);
        }
        Ok(ShutdownStatus::ShutDown)
    }
}

fn resolve<T: Copy>(library: &Library, name: &str) -> Result<T, HostError> {
    let symbol = format!("{name}\0");
    // Safety: the runtime library protocol fixes these signatures.
    unsafe {
        library
            .get::<T>(symbol.as_bytes())
            .map(|s| *s)
            .map_err(|_| HostError::SymbolMissing(name.to_string()))
    }
}

/// Production factory backed by [`VmHost`].
pub struct NativeRuntimeFactory;

struct NativeSession {
    host: VmHost,
    bridge: Arc<dyn HostedRuntimeBridge>,
}

impl RuntimeSession for NativeSession {
    fn bridge(&self) -> Arc<dyn HostedRuntimeBridge> {
        Arc::clone(&self.bridge)
    }

    fn shutdown(&self) -> Result<ShutdownStatus, HostError> {
        self.host.shutdown()
    }
}

impl RuntimeFactory for NativeRuntimeFactory {
    fn start(
        &self,
        library: &Path,
        args: &[String],
        entries: EntryPoints,
    ) -> Result<Box<dyn RuntimeSession>, HostError> {
        let host = VmHost::start(library, args, entries)?;
        let bridge = Arc::new(host.native_bridge()?);
        Ok(Box::new(NativeSession { host, bridge }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_names_cross_in_slashed_form() {
        let entry = entry_cstring("org.example.Main").unwrap();
        assert_eq!(entry.as_bytes(), b"org/example/Main");
    }

    #[test]
    fn test_shutdown_never_started() {
        let host = VmHost {
            vm: Mutex::new(None),
            entries: EntryPoints::default(),
        };
        assert_eq!(host.shutdown().unwrap(), ShutdownStatus::NeverStarted);
    }
}
