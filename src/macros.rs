//! Rank-gated logging helpers.
//!
//! Status messages are emitted by rank 0 only so a run on N workers does not
//! print every line N times. Warnings and errors are never gated.

/// `log::info!` on rank 0 of `$comm`.
macro_rules! rank0_info {
    ($comm:expr, $($arg:tt)+) => {
        if $crate::algs::communicator::Communicator::rank($comm) == 0 {
            log::info!($($arg)+);
        }
    };
}

/// `log::debug!` on rank 0 of `$comm`.
macro_rules! rank0_debug {
    ($comm:expr, $($arg:tt)+) => {
        if $crate::algs::communicator::Communicator::rank($comm) == 0 {
            log::debug!($($arg)+);
        }
    };
}
