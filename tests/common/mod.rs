//! Instrumented stand-ins for the two capability providers.
//!
//! Every native object the bridge acquires gets a fresh fake address and is
//! counted per kind, so tests can assert that nothing stays allocated after a
//! build, and every capability call is counted by name.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::ffi::{c_void, CStr};
use std::sync::{Arc, Mutex, MutexGuard};

use paravirt_compiler::core::{ConstructorAbi, ProviderError};
use paravirt_compiler::provider::options::decode_function_names;
use paravirt_compiler::provider::{
    CompilerInstanceRef, FunctionRef, GpuCompilerServices, IrServices, LibraryRef,
    MemoryBufferRef, ModuleRef, OutputSlot, Providers, SharedModuleRef,
};

pub const DEFAULT_TRIPLE: &str = "air64-apple-macosx14.0.0";

/// Kinds of native objects the bridge acquires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Compiler,
    SharedModule,
    Function,
    Library,
    Buffer,
}

pub const INTERMEDIATE_KINDS: [Kind; 3] = [Kind::SharedModule, Kind::Function, Kind::Library];

#[derive(Default)]
struct State {
    next_id: usize,
    abi: Option<ConstructorAbi>,
    live: HashMap<Kind, HashSet<usize>>,
    allocated: HashMap<Kind, usize>,
    calls: HashMap<&'static str, usize>,
    available_functions: HashSet<String>,
    function_names: HashMap<usize, String>,
    inserted: HashMap<usize, Vec<String>>,
    buffers: HashMap<usize, Vec<u8>>,
    auxiliary: Vec<Vec<u8>>,
    triple: Option<String>,
    downgrades: Vec<(usize, u64)>,
    downgrade_failure: Option<String>,
    target_infos: Vec<Vec<u8>>,
    reject_compiler: bool,
    reject_shared_module: bool,
    reject_library: bool,
    reject_write: bool,
    function_release: bool,
    released_functions: Vec<String>,
}

/// Both providers in one instrumented object.
#[derive(Clone)]
pub struct StubToolchain {
    state: Arc<Mutex<State>>,
}

impl StubToolchain {
    pub fn new(abi: ConstructorAbi) -> Self {
        let state = State {
            abi: Some(abi),
            next_id: 1,
            triple: Some(DEFAULT_TRIPLE.to_string()),
            function_release: true,
            ..State::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn legacy() -> Self {
        Self::new(ConstructorAbi::Legacy)
    }

    pub fn versioned() -> Self {
        Self::new(ConstructorAbi::Versioned)
    }

    pub fn providers(&self) -> Providers {
        Providers::new(Arc::new(self.clone()), Arc::new(self.clone()))
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    // ---- configuration ----

    pub fn with_functions(self, names: &[&str]) -> Self {
        self.state()
            .available_functions
            .extend(names.iter().map(|n| n.to_string()));
        self
    }

    pub fn with_triple(self, triple: Option<&str>) -> Self {
        self.state().triple = triple.map(str::to_string);
        self
    }

    pub fn with_auxiliary(self, outputs: [&[u8]; 3]) -> Self {
        self.state().auxiliary = outputs.iter().map(|o| o.to_vec()).collect();
        self
    }

    pub fn without_function_release(self) -> Self {
        self.state().function_release = false;
        self
    }

    pub fn fail_downgrade(&self, message: &str) {
        self.state().downgrade_failure = Some(message.to_string());
    }

    pub fn reject_compiler(&self) {
        self.state().reject_compiler = true;
    }

    pub fn reject_shared_module(&self) {
        self.state().reject_shared_module = true;
    }

    pub fn reject_library(&self) {
        self.state().reject_library = true;
    }

    pub fn reject_write(&self) {
        self.state().reject_write = true;
    }

    // ---- inspection ----

    /// A module reference the bridge may borrow.
    pub fn module(&self) -> ModuleRef {
        let id = self.state().fresh_id();
        ModuleRef::from_raw(address(id)).unwrap()
    }

    pub fn live(&self, kind: Kind) -> usize {
        self.state().live.get(&kind).map_or(0, HashSet::len)
    }

    pub fn allocated(&self, kind: Kind) -> usize {
        self.state().allocated.get(&kind).copied().unwrap_or(0)
    }

    pub fn live_intermediates(&self) -> usize {
        INTERMEDIATE_KINDS.iter().map(|&k| self.live(k)).sum()
    }

    pub fn calls(&self, capability: &str) -> usize {
        self.state().calls.get(capability).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.state().calls.values().sum()
    }

    /// Functions inserted into each library, in insertion order.
    pub fn insertions(&self) -> Vec<Vec<String>> {
        let state = self.state();
        let mut libraries: Vec<_> = state.inserted.iter().collect();
        libraries.sort_by_key(|(id, _)| **id);
        libraries.into_iter().map(|(_, names)| names.clone()).collect()
    }

    pub fn downgrades(&self) -> Vec<(ModuleRef, u64)> {
        self.state()
            .downgrades
            .iter()
            .map(|&(id, version)| (ModuleRef::from_raw(address(id)).unwrap(), version))
            .collect()
    }

    pub fn target_infos(&self) -> Vec<Vec<u8>> {
        self.state().target_infos.clone()
    }

    pub fn released_functions(&self) -> Vec<String> {
        self.state().released_functions.clone()
    }
}

impl State {
    fn fresh_id(&mut self) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn call(&mut self, capability: &'static str) {
        *self.calls.entry(capability).or_default() += 1;
    }

    fn acquire(&mut self, kind: Kind) -> usize {
        let id = self.fresh_id();
        self.live.entry(kind).or_default().insert(id);
        *self.allocated.entry(kind).or_default() += 1;
        id
    }

    fn release(&mut self, kind: Kind, raw: *mut c_void) -> usize {
        let id = id_of(raw);
        let removed = self.live.entry(kind).or_default().remove(&id);
        assert!(removed, "{kind:?} {id} released twice or never acquired");
        id
    }
}

fn address(id: usize) -> *mut c_void {
    (0x1000 + id * 0x10) as *mut c_void
}

fn id_of(raw: *mut c_void) -> usize {
    (raw as usize - 0x1000) / 0x10
}

impl IrServices for StubToolchain {
    fn module_target(&self, _module: ModuleRef) -> Option<String> {
        let mut state = self.state();
        state.call("module_target");
        state.triple.clone()
    }

    fn buffer_contents(&self, buffer: MemoryBufferRef) -> OutputSlot {
        let mut state = self.state();
        state.call("buffer_contents");
        let bytes = &state.buffers[&id_of(buffer.as_raw())];
        OutputSlot::new(bytes.as_ptr(), bytes.len())
    }

    fn dispose_buffer(&self, buffer: MemoryBufferRef) {
        let mut state = self.state();
        state.call("dispose_buffer");
        let id = state.release(Kind::Buffer, buffer.as_raw());
        state.buffers.remove(&id);
    }
}

impl GpuCompilerServices for StubToolchain {
    fn constructor_abi(&self) -> ConstructorAbi {
        self.state().abi.unwrap_or(ConstructorAbi::Legacy)
    }

    fn create_compiler(&self) -> Option<CompilerInstanceRef> {
        let mut state = self.state();
        state.call("create_compiler");
        if state.reject_compiler {
            return None;
        }
        CompilerInstanceRef::from_raw(address(state.acquire(Kind::Compiler)))
    }

    fn create_compiler_for_target(&self, target_info: &[u8]) -> Option<CompilerInstanceRef> {
        let mut state = self.state();
        state.call("create_compiler_for_target");
        state.target_infos.push(target_info.to_vec());
        if state.reject_compiler {
            return None;
        }
        CompilerInstanceRef::from_raw(address(state.acquire(Kind::Compiler)))
    }

    fn destroy_compiler(&self, compiler: CompilerInstanceRef) {
        let mut state = self.state();
        state.call("destroy_compiler");
        state.release(Kind::Compiler, compiler.as_raw());
    }

    fn requested_functions(&self, options: &[u8]) -> Result<Vec<String>, ProviderError> {
        self.state().call("requested_functions");
        decode_function_names(options)
    }

    fn downgrade_module(&self, module: ModuleRef, version: u64) -> Result<(), ProviderError> {
        let mut state = self.state();
        state.call("downgrade_module");
        state.downgrades.push((id_of(module.as_raw()), version));
        match &state.downgrade_failure {
            Some(message) => Err(ProviderError::new(message.clone())),
            None => Ok(()),
        }
    }

    fn make_shared_module(&self, _module: ModuleRef) -> Option<SharedModuleRef> {
        let mut state = self.state();
        state.call("make_shared_module");
        if state.reject_shared_module {
            return None;
        }
        SharedModuleRef::from_raw(address(state.acquire(Kind::SharedModule)))
    }

    fn dispose_shared_module(&self, shared: SharedModuleRef) {
        let mut state = self.state();
        state.call("dispose_shared_module");
        state.release(Kind::SharedModule, shared.as_raw());
    }

    fn create_function(&self, shared: SharedModuleRef, name: &CStr) -> Option<FunctionRef> {
        let mut state = self.state();
        state.call("create_function");
        assert!(
            state.live[&Kind::SharedModule].contains(&id_of(shared.as_raw())),
            "function requested from a dead shared module"
        );
        let name = name.to_str().unwrap().to_string();
        if !state.available_functions.contains(&name) {
            return None;
        }
        let id = state.acquire(Kind::Function);
        state.function_names.insert(id, name);
        FunctionRef::from_raw(address(id))
    }

    fn release_function(&self, function: FunctionRef) {
        let mut state = self.state();
        state.call("release_function");
        if state.function_release {
            let id = state.release(Kind::Function, function.as_raw());
            let name = state.function_names[&id].clone();
            state.released_functions.push(name);
        }
    }

    fn create_library(&self, triple: &CStr) -> Option<LibraryRef> {
        let mut state = self.state();
        state.call("create_library");
        assert_eq!(Some(triple.to_str().unwrap()), state.triple.as_deref());
        if state.reject_library {
            return None;
        }
        let id = state.acquire(Kind::Library);
        state.inserted.insert(id, Vec::new());
        LibraryRef::from_raw(address(id))
    }

    fn insert_function(&self, library: LibraryRef, function: FunctionRef) {
        let mut state = self.state();
        state.call("insert_function");
        let name = state.function_names[&id_of(function.as_raw())].clone();
        state
            .inserted
            .get_mut(&id_of(library.as_raw()))
            .expect("insert into a dead library")
            .push(name);
    }

    fn destroy_library(&self, library: LibraryRef) {
        let mut state = self.state();
        state.call("destroy_library");
        state.release(Kind::Library, library.as_raw());
    }

    fn write_library(&self, library: LibraryRef) -> Option<MemoryBufferRef> {
        let mut state = self.state();
        state.call("write_library");
        if state.reject_write {
            return None;
        }
        let contents = state.inserted[&id_of(library.as_raw())].join(",").into_bytes();
        let id = state.acquire(Kind::Buffer);
        state.buffers.insert(id, contents);
        MemoryBufferRef::from_raw(address(id))
    }

    fn auxiliary_outputs(&self, _library: LibraryRef) -> [OutputSlot; 3] {
        let state = self.state();
        if state.auxiliary.len() != 3 {
            return [OutputSlot::empty(); 3];
        }
        let slot = |i: usize| OutputSlot::new(state.auxiliary[i].as_ptr(), state.auxiliary[i].len());
        [slot(0), slot(1), slot(2)]
    }
}

/// Options blob naming `functions`.
pub fn options(functions: &[&str]) -> Vec<u8> {
    paravirt_compiler::provider::options::encode_function_names(functions)
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
