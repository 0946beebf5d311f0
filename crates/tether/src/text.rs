//! Conversion between UTF-8 and the UTF-16 strings native wide-character APIs take.

///UTF-16 code units of `value`, without a terminator.
pub fn widen(value: &str) -> Vec<u16> {
    value.encode_utf16().collect()
}

///Decodes UTF-16 code units. A lone surrogate raises a [LogicError](crate::LogicError).
pub fn narrow(value: &[u16]) -> String {
    match String::from_utf16(value) {
        Ok(text) => text,
        Err(e) => crate::tether_throw!("{}", e),
    }
}
