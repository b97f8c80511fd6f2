//! Fatal-path and tracing macros.

/// Report a broken invariant with its source location and abort the process.
///
/// Used for conditions the runtime cannot continue from: a dispatch slot
/// missing from the whole class chain, a Ref used outside its heap, a
/// malformed instruction. The process receives `SIGABRT`.
macro_rules! fatal {
    ($($arg:tt)*) => {
        $crate::macros::abort_with(file!(), line!(), format_args!($($arg)*))
    };
}

/// Write one trace line to stderr when the given channel is enabled.
macro_rules! trace {
    ($flags:expr, $chan:ident, $($arg:tt)*) => {
        if $flags.$chan {
            eprintln!("[sable:{}] {}", stringify!($chan), format_args!($($arg)*));
        }
    };
}

#[cold]
#[inline(never)]
pub(crate) fn abort_with(file: &str, line: u32, args: std::fmt::Arguments<'_>) -> ! {
    eprintln!("fatal: {file}:{line}: {args}");
    std::process::abort()
}
