//! Fragment tree types produced by the parser.
use std::fmt;

/// A location in fragment source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    /// Byte offset from the start of the source.
    pub offset: usize,
    /// 1-based line number.
    pub line: usize,
    /// 1-based column, counted in characters.
    pub column: usize,
}

impl Position {
    pub(crate) const fn start() -> Self {
        Self {
            offset: 0,
            line: 1,
            column: 1,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A literal scalar value, kept as written.
///
/// Numbers retain their literal text so that `0.1` round-trips as `0.1`
/// rather than an `f64` rendering of it.
///
/// # Examples
///
/// ```
/// use cfgpatch::fragment::Scalar;
///
/// let n = Scalar::Number("0.1".to_string());
/// assert_eq!(n.as_f64(), Some(0.1));
/// assert_eq!(n.to_string(), "0.1");
///
/// let s = Scalar::String("say \"hi\"".to_string());
/// assert_eq!(s.to_string(), "\"say \"\"hi\"\"\"");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scalar {
    /// A numeric literal (decimal, float or `0x` hex), verbatim.
    Number(String),
    /// A double-quoted string with escapes resolved.
    String(String),
    /// `true` / `false`.
    Bool(bool),
}

impl Scalar {
    /// Borrow the string payload, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Interpret the value as a float. Hex literals are accepted.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(raw) => parse_hex(raw).map_or_else(|| raw.parse().ok(), |v| Some(v as f64)),
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::String(_) => None,
        }
    }

    /// Interpret the value as an integer. Floats with a fractional part are rejected.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(raw) => parse_hex(raw).or_else(|| raw.parse().ok()),
            Self::Bool(b) => Some(i64::from(*b)),
            Self::String(_) => None,
        }
    }

    /// Interpret `0`/`1` (or `true`/`false`) as a boolean.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Number(_) => match self.as_i64()? {
                0 => Some(false),
                1 => Some(true),
                _ => None,
            },
            Self::String(_) => None,
        }
    }

    /// The text form used for version parsing: numbers verbatim, strings unquoted.
    #[must_use]
    pub fn text(&self) -> String {
        match self {
            Self::Number(raw) => raw.clone(),
            Self::String(s) => s.clone(),
            Self::Bool(b) => b.to_string(),
        }
    }
}

fn parse_hex(raw: &str) -> Option<i64> {
    let (negative, body) = raw
        .strip_prefix('-')
        .map_or((false, raw), |rest| (true, rest));
    let digits = body
        .strip_prefix("0x")
        .or_else(|| body.strip_prefix("0X"))?;
    let value = i64::from_str_radix(digits, 16).ok()?;
    Some(if negative { -value } else { value })
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(raw) => f.write_str(raw),
            Self::String(s) => write!(f, "\"{}\"", s.replace('"', "\"\"")),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// A property value: a single scalar or an ordered array of scalars.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// `name = scalar;`
    Scalar(Scalar),
    /// `name[] = { ... };`
    Array(Vec<Scalar>),
}

impl Value {
    /// Whether this is an array value.
    #[must_use]
    pub const fn is_array(&self) -> bool {
        matches!(self, Self::Array(_))
    }

    /// The scalar, unless this is an array.
    #[must_use]
    pub const fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Self::Scalar(s) => Some(s),
            Self::Array(_) => None,
        }
    }

    /// The array elements, unless this is a scalar.
    #[must_use]
    pub fn as_array(&self) -> Option<&[Scalar]> {
        match self {
            Self::Array(items) => Some(items),
            Self::Scalar(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(s) => write!(f, "{s}"),
            Self::Array(items) => {
                f.write_str("{")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("}")
            }
        }
    }
}

/// One property declaration inside a class body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyEntry {
    /// Property name as written.
    pub name: String,
    /// Declared value.
    pub value: Value,
    /// `true` for the additive `name[] += {...}` form.
    pub append: bool,
    /// Where the (first) declaration starts.
    pub position: Position,
}

/// A named class declaration in a fragment.
///
/// Child names are unique per parent (case-insensitive): the parser folds a
/// repeated declaration into the first one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentNode {
    /// Class name as written.
    pub name: String,
    /// Inheritance reference (`class Name: Base`).
    pub parent: Option<String>,
    /// Properties in declaration order.
    pub properties: Vec<PropertyEntry>,
    /// Nested classes in declaration order.
    pub children: Vec<Self>,
    /// `class Name;` with no body.
    pub forward: bool,
    /// Where the declaration starts.
    pub position: Position,
}

impl FragmentNode {
    /// Lookup key for case-insensitive name comparison.
    #[must_use]
    pub fn key(&self) -> String {
        name_key(&self.name)
    }

    /// Find a direct child class by name (case-insensitive).
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&Self> {
        let key = name_key(name);
        self.children.iter().find(|c| c.key() == key)
    }

    /// Find a property by name (case-insensitive).
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&PropertyEntry> {
        let key = name_key(name);
        self.properties.iter().find(|p| name_key(&p.name) == key)
    }
}

/// Normalise a class or property name for case-insensitive identity.
#[must_use]
pub fn name_key(name: &str) -> String {
    name.to_ascii_lowercase()
}

/// Find a top-level class in a parsed forest by name (case-insensitive).
#[must_use]
pub fn find_class<'a>(forest: &'a [FragmentNode], name: &str) -> Option<&'a FragmentNode> {
    let key = name_key(name);
    forest.iter().find(|c| c.key() == key)
}
