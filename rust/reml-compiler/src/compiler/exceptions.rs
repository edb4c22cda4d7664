//! Built-in exception tags (§6.4): the fixed set of exceptions the
//! built-in catalog's operations may raise. Not user-extensible —
//! datatype-declared exceptions are out of scope here.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExceptionTag {
    /// `List.nth`, `Vector.sub`, etc. on an out-of-range index.
    Subscript,
    /// `Vector.tabulate` and friends with a negative requested size.
    Size,
    /// `List.hd`/`List.tl`/`List.last` on `[]`.
    Empty,
    /// `Option.valOf NONE`.
    Option,
    /// `Char.chr` outside the representable range.
    Chr,
    /// A built-in applied outside its declared domain (e.g. `Math.ln` of
    /// a negative number as a checked precondition rather than `NaN`).
    Domain,
    /// `_ div 0` / `_ mod 0`.
    Div,
    /// Arithmetic result outside the representable range.
    Overflow,
}

impl ExceptionTag {
    pub const ALL: [ExceptionTag; 8] = [
        ExceptionTag::Subscript,
        ExceptionTag::Size,
        ExceptionTag::Empty,
        ExceptionTag::Option,
        ExceptionTag::Chr,
        ExceptionTag::Domain,
        ExceptionTag::Div,
        ExceptionTag::Overflow,
    ];

    pub fn ml_name(&self) -> &'static str {
        match self {
            ExceptionTag::Subscript => "Subscript",
            ExceptionTag::Size => "Size",
            ExceptionTag::Empty => "Empty",
            ExceptionTag::Option => "Option",
            ExceptionTag::Chr => "Chr",
            ExceptionTag::Domain => "Domain",
            ExceptionTag::Div => "Div",
            ExceptionTag::Overflow => "Overflow",
        }
    }
}

impl fmt::Display for ExceptionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ml_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_tags_have_distinct_names() {
        let names: std::collections::HashSet<_> = ExceptionTag::ALL.iter().map(|t| t.ml_name()).collect();
        assert_eq!(names.len(), ExceptionTag::ALL.len());
    }
}
