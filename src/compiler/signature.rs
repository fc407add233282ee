//! Method signatures and their canonical string form.
//!
//! A signature captures a method's name and parameter-list shape. Its
//! canonical string (`foo(_,_)`, `bar=(_)`, `[_]`, …) is interned into the
//! VM's global symbol table, so a call site and a method definition with the
//! same shape always agree on one symbol.

use std::fmt;

/// The different signature syntaxes for different kinds of methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureType {
    /// A name followed by a (possibly empty) parenthesized parameter list.
    /// Also used for binary operators.
    Method,
    /// Just a name. Also used for unary operators.
    Getter,
    /// A name followed by "=".
    Setter,
    /// A square-bracketed parameter list.
    Subscript,
    /// A square-bracketed parameter list followed by "=".
    SubscriptSetter,
    /// A constructor initializer. Distinct so it cannot be invoked directly,
    /// only through the synthesized metaclass constructor.
    Initializer,
}

#[derive(Debug, Clone)]
pub struct Signature {
    pub name: String,
    pub sig_type: SignatureType,
    pub arity: usize,
}

impl Default for Signature {
    fn default() -> Self {
        Self {
            name: String::new(),
            sig_type: SignatureType::Getter,
            arity: 0,
        }
    }
}

impl Signature {
    pub fn new(name: impl Into<String>, sig_type: SignatureType, arity: usize) -> Self {
        Self {
            name: name.into(),
            sig_type,
            arity,
        }
    }
}

/// Append `count` underscores surrounded by the bracket pair.
fn parameter_list(out: &mut String, count: usize, left: char, right: char) {
    out.push(left);
    for i in 0..count {
        if i > 0 {
            out.push(',');
        }
        out.push('_');
    }
    out.push(right);
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        match self.sig_type {
            SignatureType::Method => {
                out.push_str(&self.name);
                parameter_list(&mut out, self.arity, '(', ')');
            }
            SignatureType::Getter => out.push_str(&self.name),
            SignatureType::Setter => {
                out.push_str(&self.name);
                out.push('=');
                parameter_list(&mut out, 1, '(', ')');
            }
            SignatureType::Subscript => {
                out.push_str(&self.name);
                parameter_list(&mut out, self.arity, '[', ']');
            }
            SignatureType::SubscriptSetter => {
                out.push_str(&self.name);
                parameter_list(&mut out, self.arity - 1, '[', ']');
                out.push('=');
                parameter_list(&mut out, 1, '(', ')');
            }
            SignatureType::Initializer => {
                out.push_str("init ");
                out.push_str(&self.name);
                parameter_list(&mut out, self.arity, '(', ')');
            }
        }
        write!(f, "{}", out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_signatures() {
        assert_eq!(
            Signature::new("foo", SignatureType::Method, 0).to_string(),
            "foo()"
        );
        assert_eq!(
            Signature::new("foo", SignatureType::Method, 2).to_string(),
            "foo(_,_)"
        );
    }

    #[test]
    fn test_getter_and_setter() {
        assert_eq!(
            Signature::new("value", SignatureType::Getter, 0).to_string(),
            "value"
        );
        assert_eq!(
            Signature::new("value", SignatureType::Setter, 1).to_string(),
            "value=(_)"
        );
    }

    #[test]
    fn test_subscripts() {
        assert_eq!(
            Signature::new("", SignatureType::Subscript, 2).to_string(),
            "[_,_]"
        );
        assert_eq!(
            Signature::new("", SignatureType::SubscriptSetter, 2).to_string(),
            "[_]=(_)"
        );
    }

    #[test]
    fn test_initializer() {
        assert_eq!(
            Signature::new("new", SignatureType::Initializer, 1).to_string(),
            "init new(_)"
        );
    }

    #[test]
    fn test_operator_signatures() {
        // Binary operators are one-argument methods; unary ones are getters.
        assert_eq!(
            Signature::new("+", SignatureType::Method, 1).to_string(),
            "+(_)"
        );
        assert_eq!(Signature::new("!", SignatureType::Getter, 0).to_string(), "!");
    }
}
