/// The stored value domain: either a present byte string, or the explicit
/// absence sentinel written by `UNSET`.
///
/// `Absent` is a real, versioned entry distinct from "this key has never
/// been written" — a read that lands on an `Absent` entry is a *hit* (it
/// stops fall-through to a parent scope) that happens to report `NULL`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Real(Vec<u8>),
    Absent,
}

impl Value {
    pub fn is_real(&self) -> bool {
        matches!(self, Value::Real(_))
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Real(b) => Some(b),
            Value::Absent => None,
        }
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Real(b)
    }
}
