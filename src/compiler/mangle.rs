//! Function name mangling.
//!
//! Every value is a double, so a function is identified by its name and
//! arity alone: `_Z<len><name>` followed by one `d` per argument.

/// Encode `name` called with `arity` arguments, e.g. `_Z3sind` for `sin/1`.
pub fn mangle(name: &str, arity: usize) -> String {
    format!("_Z{}{}{}", name.len(), name, "d".repeat(arity))
}

/// Render a mangled name as a C-like signature, e.g.
/// `double pow(double, double)`. Anything that does not parse is returned
/// unchanged.
pub fn demangle(symbol: &str) -> String {
    match split_mangled(symbol) {
        Some((name, arity)) => {
            let params = vec!["double"; arity].join(", ");
            format!("double {}({})", name, params)
        }
        None => symbol.to_string(),
    }
}

/// Name and arity of a mangled symbol.
pub fn split_mangled(symbol: &str) -> Option<(&str, usize)> {
    let rest = symbol.strip_prefix("_Z")?;
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    let len: usize = rest[..digits].parse().ok()?;
    let rest = &rest[digits..];
    let name = rest.get(..len)?;
    let params = &rest[len..];
    if !params.bytes().all(|b| b == b'd') {
        return None;
    }
    Some((name, params.len()))
}
