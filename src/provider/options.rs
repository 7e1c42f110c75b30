//! Function list carried in the native build options blob.
//!
//! The blob is a sequence of NUL-separated UTF-8 function names. Empty
//! segments (including a trailing terminator) are skipped.

use crate::core::ProviderError;

/// Decode the requested function names, preserving blob order.
pub fn decode_function_names(options: &[u8]) -> Result<Vec<String>, ProviderError> {
    options
        .split(|&b| b == 0)
        .filter(|segment| !segment.is_empty())
        .enumerate()
        .map(|(index, segment)| {
            std::str::from_utf8(segment)
                .map(str::to_owned)
                .map_err(|e| ProviderError::new(format!("function name {index} is not UTF-8: {e}")))
        })
        .collect()
}

/// Encode `names` in the layout [`decode_function_names`] reads.
pub fn encode_function_names<S: AsRef<str>>(names: &[S]) -> Vec<u8> {
    let mut blob = Vec::new();
    for name in names {
        blob.extend_from_slice(name.as_ref().as_bytes());
        blob.push(0);
    }
    blob
}
