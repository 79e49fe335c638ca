//! Branch hints that work on stable. A call to a `#[cold]` function on one side of a branch is
//! enough for the optimizer to lay that side out of line.

#[cold]
#[inline(never)]
fn cold() {}

#[inline(always)]
#[doc(hidden)]
pub fn _likely(b: bool) -> bool {
    if !b {
        cold()
    }
    b
}

#[inline(always)]
#[doc(hidden)]
pub fn _unlikely(b: bool) -> bool {
    if b {
        cold()
    }
    b
}

macro_rules! unlikely {
    ($e:expr) => {
        $crate::internal::optim::_unlikely($e)
    };
}

macro_rules! likely {
    ($e:expr) => {{
        $crate::internal::optim::_likely($e)
    }};
}
