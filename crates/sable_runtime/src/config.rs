//! Runtime configuration.

/// Stderr trace channels, enabled through `SABLE_TRACE`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TraceFlags {
    pub gc: bool,
    pub task: bool,
    pub vm: bool,
    pub module: bool,
}

impl TraceFlags {
    pub const ALL: TraceFlags = TraceFlags { gc: true, task: true, vm: true, module: true };

    /// Parse a comma separated channel list such as `gc,task` or `all`.
    /// Unknown channel names are ignored.
    pub fn parse(spec: &str) -> Self {
        let mut flags = TraceFlags::default();
        for part in spec.split(',').map(str::trim) {
            match part.to_ascii_lowercase().as_str() {
                "all" | "1" | "true" => return Self::ALL,
                "gc" => flags.gc = true,
                "task" => flags.task = true,
                "vm" => flags.vm = true,
                "module" => flags.module = true,
                _ => {}
            }
        }
        flags
    }
}

/// Runtime configuration options, shared by every task of a process.
#[derive(Clone, Copy, Debug)]
pub struct RuntimeConfig {
    /// Allocations before the first collection is considered.
    pub gc_threshold: usize,
    /// Floor for the adaptive threshold recomputed after each sweep.
    pub gc_min_threshold: usize,
    /// Next threshold = live objects * growth.
    pub gc_growth: f64,
    /// The VM checks the threshold every this many instructions.
    pub gc_check_interval: usize,
    /// Deepest frame stack before a call fails with a stack overflow. Nested
    /// interpreter loops started by natives count toward it too.
    pub max_frames: usize,
    /// Most interpreter loops nested through natives (constructors, bound
    /// natives calling back into bytecode) before a stack overflow.
    pub max_native_depth: usize,
    /// Thread stack for spawned tasks, in bytes.
    pub task_stack_size: usize,
    pub trace: TraceFlags,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            gc_threshold: 10_000,
            gc_min_threshold: 1024,
            gc_growth: 2.0,
            gc_check_interval: 1024,
            max_frames: 10_000,
            max_native_depth: 100,
            task_stack_size: 32 * 1024 * 1024,
            trace: TraceFlags::default(),
        }
    }
}

impl RuntimeConfig {
    /// Defaults overridden by `SABLE_GC_THRESHOLD`, `SABLE_GC_CHECK_INTERVAL`,
    /// `SABLE_MAX_FRAMES`, `SABLE_MAX_NATIVE_DEPTH`, `SABLE_TASK_STACK` and
    /// `SABLE_TRACE`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();
        let num = |key: &str| lookup(key).and_then(|v| v.trim().parse::<usize>().ok());
        if let Some(n) = num("SABLE_GC_THRESHOLD") {
            cfg.gc_threshold = n.max(1);
        }
        if let Some(n) = num("SABLE_GC_CHECK_INTERVAL") {
            cfg.gc_check_interval = n.max(1);
        }
        if let Some(n) = num("SABLE_MAX_FRAMES") {
            cfg.max_frames = n.max(1);
        }
        if let Some(n) = num("SABLE_MAX_NATIVE_DEPTH") {
            cfg.max_native_depth = n.max(1);
        }
        if let Some(n) = num("SABLE_TASK_STACK") {
            cfg.task_stack_size = n.max(64 * 1024);
        }
        if let Some(spec) = lookup("SABLE_TRACE") {
            cfg.trace = TraceFlags::parse(&spec);
        }
        cfg
    }
}
