//! Native helpers callable from emitted code.
//!
//! The code generator embeds the address of each `extern "C"` shim as a
//! constant pointer and calls it indirectly, so nothing here goes through
//! symbol resolution. The safe cores are plain Rust functions; the shims
//! only rebuild slices from the raw pointers the emitted code holds.

#[cfg(test)]
mod tests;

use std::ffi::CStr;

use memchr::memchr;

/// Length of the null-terminated input, excluding the terminator.
///
/// # Safety
///
/// `s` must point to a null-terminated byte string.
pub unsafe extern "C" fn rf_strlen(s: *const u8) -> usize {
    unsafe { CStr::from_ptr(s.cast()).to_bytes().len() }
}

/// First occurrence of `byte` in `hay[..len]`, or null.
///
/// # Safety
///
/// `hay` must be valid for reads of `len` bytes.
pub unsafe extern "C" fn rf_memchr(hay: *const u8, len: usize, byte: u32) -> *const u8 {
    let hay = unsafe { std::slice::from_raw_parts(hay, len) };
    match memchr(byte as u8, hay) {
        Some(i) => hay[i..].as_ptr(),
        None => std::ptr::null(),
    }
}

/// Boyer-Moore-Horspool substring search; returns a pointer to the first
/// occurrence of the needle or null.
///
/// # Safety
///
/// `hay` and `needle` must be valid for reads of their stated lengths.
pub unsafe extern "C" fn rf_bmh_search(
    hay: *const u8,
    hay_len: usize,
    needle: *const u8,
    needle_len: usize,
) -> *const u8 {
    let hay = unsafe { std::slice::from_raw_parts(hay, hay_len) };
    let needle = unsafe { std::slice::from_raw_parts(needle, needle_len) };
    match bmh_search(hay, needle) {
        Some(i) => hay[i..].as_ptr(),
        None => std::ptr::null(),
    }
}

/// Length of the run of `target` bytes at the start of `buf[..len]`.
///
/// # Safety
///
/// `buf` must be valid for reads of `len` bytes.
pub unsafe extern "C" fn rf_count_char(buf: *const u8, len: usize, target: u32) -> usize {
    let buf = unsafe { std::slice::from_raw_parts(buf, len) };
    count_run(buf, target as u8)
}

/// Diagnostic sink for emitted code; compiled to a no-op in release.
pub extern "C" fn rf_trace(tag: u32, index: u64, count: u64) {
    #[cfg(debug_assertions)]
    tracing::trace!(tag, index, count, "emitted-code trace");
    #[cfg(not(debug_assertions))]
    let _ = (tag, index, count);
}

/// Substring search specialized by needle length: a bare `memchr` for one
/// byte, `memchr` plus a short compare up to three bytes, and a
/// bad-character shift table beyond that.
pub(crate) fn bmh_search(hay: &[u8], needle: &[u8]) -> Option<usize> {
    let n = needle.len();
    match n {
        0 => Some(0),
        1 => memchr(needle[0], hay),
        2 | 3 => {
            let mut at = 0;
            while let Some(i) = memchr(needle[0], &hay[at..]) {
                let start = at + i;
                if hay.len() - start >= n && &hay[start..start + n] == needle {
                    return Some(start);
                }
                at = start + 1;
            }
            None
        }
        _ => {
            if hay.len() < n {
                return None;
            }
            let mut shift = [n; 256];
            for (i, &b) in needle[..n - 1].iter().enumerate() {
                shift[b as usize] = n - 1 - i;
            }
            let first = needle[0];
            let last = needle[n - 1];
            let mut pos = 0;
            while pos + n <= hay.len() {
                let b = hay[pos + n - 1];
                if b == last && hay[pos] == first && &hay[pos..pos + n] == needle {
                    return Some(pos);
                }
                pos += shift[b as usize];
            }
            None
        }
    }
}

/// Run-length count in 8-byte chunks with a byte-wise tail; the word
/// compare lets the backend vectorize the common all-equal case.
pub(crate) fn count_run(buf: &[u8], target: u8) -> usize {
    let splat = u64::from_ne_bytes([target; 8]);
    let mut n = 0;
    let mut chunks = buf.chunks_exact(8);
    for chunk in chunks.by_ref() {
        let word = u64::from_ne_bytes(chunk.try_into().unwrap());
        if word == splat {
            n += 8;
            continue;
        }
        for &b in chunk {
            if b != target {
                return n;
            }
            n += 1;
        }
    }
    for &b in chunks.remainder() {
        if b != target {
            return n;
        }
        n += 1;
    }
    n
}
