// Structural assertions. A violated invariant means the row projection is
// corrupt; both macros log at `error` and then panic.

macro_rules! structure_fail {
    ($($arg:tt)+) => {{
        let message = format!($($arg)+);
        log::error!(target: "livegrid", "structural assertion failed: {}", message);
        panic!("livegrid structural assertion failed: {}", message)
    }};
}

macro_rules! structure_assert {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            structure_fail!($($arg)+)
        }
    };
}
