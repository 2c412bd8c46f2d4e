//! Pointer checks shared by the ABI entry points.

/// Borrow `*ptr` or return `$ret` from the enclosing function when it is null.
macro_rules! deref_or_return {
    ($ptr:expr, $ret:expr) => {{
        let ptr = $ptr;
        if ptr.is_null() {
            return $ret;
        }
        // SAFETY: non-null, and by contract obtained from the matching
        // `*_init`/`*_create` and not yet destroyed.
        unsafe { &*ptr }
    }};
}

/// Store `value` through the out-pointer `out`, or return EINVAL when null.
macro_rules! write_out_or_einval {
    ($out:expr, $value:expr) => {{
        let out = $out;
        if out.is_null() {
            return libc::EINVAL;
        }
        // SAFETY: non-null out-pointer supplied by the caller.
        unsafe { out.write($value) };
    }};
}

pub(crate) use deref_or_return;
pub(crate) use write_out_or_einval;
