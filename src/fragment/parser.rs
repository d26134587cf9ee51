//! Recursive-descent parser from tokens to a [`FragmentNode`] forest.
//!
//! Grammar (informal):
//!
//! ```text
//! fragment   := class_decl*
//! class_decl := "class" IDENT ( ";" | [ ":" IDENT ] "{" member* "}" ";" )
//! member     := class_decl | property
//! property   := IDENT "=" scalar ";"
//!             | IDENT "[" "]" ( "=" | "+=" ) "{" [ scalar ( "," scalar )* [","] ] "}" ";"
//! scalar     := NUMBER | STRING | "true" | "false"
//! ```
//!
//! The `;` after the final closing brace of a fragment may be omitted.
use super::lexer::{Token, TokenKind, tokenize};
use super::node::{FragmentNode, Position, PropertyEntry, Scalar, Value, name_key};
use crate::error::{ParseError, ParseErrorKind};

const CLASS_KEYWORD: &str = "class";

/// Parse fragment source text into its top-level classes.
///
/// Repeated declarations of the same class within one parent are folded
/// into the first declaration. An empty source yields
/// an empty forest.
///
/// # Examples
///
/// ```
/// use cfgpatch::fragment::{parse_fragment, Value};
///
/// let forest = parse_fragment("class CfgMods { class Core { files[] += {\"a\"}; }; };").unwrap();
/// let core = forest[0].child("Core").unwrap();
/// let files = core.property("files").unwrap();
/// assert!(files.append);
/// assert!(matches!(files.value, Value::Array(ref v) if v.len() == 1));
/// ```
///
/// # Errors
///
/// Returns a [`ParseError`] with the position and reason of the first
/// syntax error.
pub fn parse_fragment(source: &str) -> Result<Vec<FragmentNode>, ParseError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    parser.parse_top_level()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        // The token stream always ends with Eof, and `advance` never moves past it.
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .unwrap_or(&EOF_TOKEN)
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn unexpected(token: &Token, expected: &'static str) -> ParseError {
        let kind = if token.kind == TokenKind::Eof {
            ParseErrorKind::UnexpectedEof { expected }
        } else {
            ParseErrorKind::UnexpectedToken {
                found: token.kind.to_string(),
                expected,
            }
        };
        ParseError::new(token.position, kind)
    }

    fn expect(&mut self, kind: &TokenKind, expected: &'static str) -> Result<Token, ParseError> {
        let token = self.advance();
        if &token.kind == kind {
            Ok(token)
        } else {
            Err(Self::unexpected(&token, expected))
        }
    }

    fn expect_ident(&mut self, expected: &'static str) -> Result<String, ParseError> {
        let token = self.advance();
        match &token.kind {
            TokenKind::Ident(name) if name != CLASS_KEYWORD => Ok(name.clone()),
            _ => Err(Self::unexpected(&token, expected)),
        }
    }

    fn parse_top_level(&mut self) -> Result<Vec<FragmentNode>, ParseError> {
        let mut forest = Vec::new();
        loop {
            let token = self.peek().clone();
            match &token.kind {
                TokenKind::Eof => return Ok(forest),
                TokenKind::RBrace => {
                    return Err(ParseError::new(
                        token.position,
                        ParseErrorKind::UnbalancedBraces("'}' without matching '{'"),
                    ));
                }
                TokenKind::Ident(word) if word == CLASS_KEYWORD => {
                    let node = self.parse_class()?;
                    fold_child(&mut forest, node);
                }
                _ => return Err(Self::unexpected(&token, "'class'")),
            }
        }
    }

    /// Parse `class Name [: Base] { ... };` or `class Name;`.
    fn parse_class(&mut self) -> Result<FragmentNode, ParseError> {
        let class_token = self.advance();
        let name = self.expect_ident("class name")?;

        if *self.peek_kind() == TokenKind::Semicolon {
            self.advance();
            return Ok(FragmentNode {
                name,
                parent: None,
                properties: Vec::new(),
                children: Vec::new(),
                forward: true,
                position: class_token.position,
            });
        }

        let parent = if *self.peek_kind() == TokenKind::Colon {
            self.advance();
            Some(self.expect_ident("base class name")?)
        } else {
            None
        };

        let open = self.expect(&TokenKind::LBrace, "'{' or ';'")?;
        let mut node = FragmentNode {
            name,
            parent,
            properties: Vec::new(),
            children: Vec::new(),
            forward: false,
            position: class_token.position,
        };
        self.parse_body(&mut node, &open)?;
        self.expect_class_terminator()?;
        Ok(node)
    }

    fn expect_class_terminator(&mut self) -> Result<(), ParseError> {
        match self.peek_kind() {
            TokenKind::Semicolon => {
                self.advance();
                Ok(())
            }
            // Trailing `;` after the last class of a fragment is optional.
            TokenKind::Eof => Ok(()),
            _ => Err(Self::unexpected(self.peek(), "';' after class body")),
        }
    }

    fn parse_body(&mut self, node: &mut FragmentNode, open: &Token) -> Result<(), ParseError> {
        loop {
            let token = self.peek().clone();
            match &token.kind {
                TokenKind::RBrace => {
                    self.advance();
                    return Ok(());
                }
                TokenKind::Eof => {
                    return Err(ParseError::new(
                        open.position,
                        ParseErrorKind::UnbalancedBraces("'{' is never closed"),
                    ));
                }
                TokenKind::Ident(word) if word == CLASS_KEYWORD => {
                    let child = self.parse_class()?;
                    fold_child(&mut node.children, child);
                }
                TokenKind::Ident(_) => {
                    let entry = self.parse_property()?;
                    fold_property(&mut node.properties, entry);
                }
                _ => return Err(Self::unexpected(&token, "property or 'class'")),
            }
        }
    }

    fn parse_property(&mut self) -> Result<PropertyEntry, ParseError> {
        let name_token = self.advance();
        let name = match &name_token.kind {
            TokenKind::Ident(name) => name.clone(),
            _ => return Err(Self::unexpected(&name_token, "property name")),
        };

        if *self.peek_kind() == TokenKind::LBracket {
            self.advance();
            self.expect(&TokenKind::RBracket, "']'")?;
            let marker = self.advance();
            let append = match marker.kind {
                TokenKind::Assign => false,
                TokenKind::PlusAssign => true,
                _ => return Err(Self::unexpected(&marker, "'=' or '+='")),
            };
            if matches!(self.peek_kind(), TokenKind::Assign | TokenKind::PlusAssign) {
                return Err(ParseError::new(
                    self.peek().position,
                    ParseErrorKind::RepeatedAppendMarker(name),
                ));
            }
            let items = self.parse_array()?;
            self.expect(&TokenKind::Semicolon, "';'")?;
            return Ok(PropertyEntry {
                name,
                value: Value::Array(items),
                append,
                position: name_token.position,
            });
        }

        let marker = self.advance();
        match marker.kind {
            TokenKind::Assign => {}
            TokenKind::PlusAssign => {
                return Err(ParseError::new(
                    marker.position,
                    ParseErrorKind::AppendOnScalar(name),
                ));
            }
            _ => return Err(Self::unexpected(&marker, "'=' or '[]'")),
        }
        let value = self.parse_scalar()?;
        self.expect(&TokenKind::Semicolon, "';'")?;
        Ok(PropertyEntry {
            name,
            value: Value::Scalar(value),
            append: false,
            position: name_token.position,
        })
    }

    fn parse_array(&mut self) -> Result<Vec<Scalar>, ParseError> {
        self.expect(&TokenKind::LBrace, "'{'")?;
        let mut items = Vec::new();
        loop {
            if *self.peek_kind() == TokenKind::RBrace {
                self.advance();
                return Ok(items);
            }
            items.push(self.parse_scalar()?);
            let separator = self.advance();
            match separator.kind {
                TokenKind::Comma => {}
                TokenKind::RBrace => return Ok(items),
                _ => return Err(Self::unexpected(&separator, "',' or '}'")),
            }
        }
    }

    fn parse_scalar(&mut self) -> Result<Scalar, ParseError> {
        let token = self.advance();
        match &token.kind {
            TokenKind::Number(raw) => Ok(Scalar::Number(raw.clone())),
            TokenKind::Str(s) => Ok(Scalar::String(s.clone())),
            TokenKind::Ident(word) if word == "true" => Ok(Scalar::Bool(true)),
            TokenKind::Ident(word) if word == "false" => Ok(Scalar::Bool(false)),
            _ => Err(Self::unexpected(&token, "number, string or boolean")),
        }
    }
}

static EOF_TOKEN: Token = Token {
    kind: TokenKind::Eof,
    position: Position {
        offset: 0,
        line: 1,
        column: 1,
    },
};

/// Fold a property declaration into a class body.
///
/// A later `=` replaces the earlier declaration, array or not. A later `+=`
/// onto an earlier array declaration chains: the values accumulate and the
/// earlier entry keeps its own append flag.
fn fold_property(properties: &mut Vec<PropertyEntry>, entry: PropertyEntry) {
    let key = name_key(&entry.name);
    let Some(existing) = properties.iter_mut().find(|p| name_key(&p.name) == key) else {
        properties.push(entry);
        return;
    };

    if let (true, Value::Array(current), Value::Array(more)) =
        (entry.append, &mut existing.value, &entry.value)
    {
        current.extend(more.iter().cloned());
    } else {
        existing.value = entry.value;
        existing.append = entry.append;
    }
}

/// Fold a class declaration into a list of siblings.
///
/// A forward declaration never overrides a body; a body supersedes a forward
/// declaration; two bodies fold recursively, the later base reference winning.
fn fold_child(siblings: &mut Vec<FragmentNode>, node: FragmentNode) {
    let key = node.key();
    let Some(existing) = siblings.iter_mut().find(|c| c.key() == key) else {
        siblings.push(node);
        return;
    };

    if node.forward {
        return;
    }
    if existing.forward {
        *existing = node;
        return;
    }

    if node.parent.is_some() {
        existing.parent = node.parent;
    }
    for entry in node.properties {
        fold_property(&mut existing.properties, entry);
    }
    for child in node.children {
        fold_child(&mut existing.children, child);
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Vec<FragmentNode> {
        parse_fragment(source).expect("test data should parse")
    }

    fn strings(values: &[&str]) -> Value {
        Value::Array(
            values
                .iter()
                .map(|s| Scalar::String((*s).to_string()))
                .collect(),
        )
    }

    fn err_kind(source: &str) -> ParseErrorKind {
        parse_fragment(source).expect_err("should fail").kind
    }

    // -----------------------------------------------------------------------
    // Structure
    // -----------------------------------------------------------------------

    #[test]
    fn parses_registration_fixture() {
        let forest = parse(include_str!("../../tests/fixtures/add_mission_script.cpp"));
        assert_eq!(forest.len(), 2);

        let patch = forest[0].child("ADD_MISSION_SCRIPT").expect("patch class");
        assert_eq!(
            patch.property("requiredVersion").unwrap().value,
            Value::Scalar(Scalar::Number("0.1".to_string()))
        );
        assert_eq!(
            patch.property("requiredAddons").unwrap().value,
            strings(&["JM_CF_Scripts", "DZ_Data"])
        );

        let module = forest[1]
            .child("JM_CommunityFramework")
            .and_then(|c| c.child("defs"))
            .and_then(|c| c.child("missionScriptModule"))
            .expect("nested module class");
        let files = module.property("files").unwrap();
        assert!(files.append);
        assert_eq!(files.value, strings(&["test/path/5_Mission/"]));
    }

    #[test]
    fn empty_source_is_empty_forest() {
        assert!(parse("").is_empty());
        assert!(parse("// nothing here\n").is_empty());
    }

    #[test]
    fn empty_body_is_valid() {
        let forest = parse("class A {};");
        assert!(forest[0].properties.is_empty());
        assert!(forest[0].children.is_empty());
        assert!(!forest[0].forward);
    }

    #[test]
    fn inheritance_reference() {
        let forest = parse("class Outer { class Base {}; class Child: Base { x = 1; }; };");
        let child = forest[0].child("Child").unwrap();
        assert_eq!(child.parent.as_deref(), Some("Base"));
    }

    #[test]
    fn forward_declaration() {
        let forest = parse("class CfgVehicles { class Car; };");
        let car = forest[0].child("Car").unwrap();
        assert!(car.forward);
    }

    #[test]
    fn final_semicolon_is_optional() {
        let forest = parse("class A { x = 1; }");
        assert_eq!(forest.len(), 1);
    }

    #[test]
    fn scalar_kinds() {
        let forest = parse("class A { n = -1.5; s = \"x\"; t = true; f = false; h = 0x10; };");
        let a = &forest[0];
        assert_eq!(
            a.property("n").unwrap().value,
            Value::Scalar(Scalar::Number("-1.5".to_string()))
        );
        assert_eq!(
            a.property("t").unwrap().value,
            Value::Scalar(Scalar::Bool(true))
        );
        assert_eq!(
            a.property("f").unwrap().value,
            Value::Scalar(Scalar::Bool(false))
        );
        assert_eq!(
            a.property("h").unwrap().value,
            Value::Scalar(Scalar::Number("0x10".to_string()))
        );
    }

    #[test]
    fn array_trailing_comma_and_empty() {
        let forest = parse("class A { a[] = {\"x\", \"y\",}; b[] = {}; };");
        assert_eq!(forest[0].property("a").unwrap().value, strings(&["x", "y"]));
        assert_eq!(forest[0].property("b").unwrap().value, strings(&[]));
    }

    // -----------------------------------------------------------------------
    // In-fragment folding
    // -----------------------------------------------------------------------

    #[test]
    fn repeated_class_folds_into_first() {
        let forest = parse("class A { x = 1; }; class B {}; class a { y = 2; x = 3; };");
        assert_eq!(forest.len(), 2);
        let a = &forest[0];
        assert_eq!(a.name, "A");
        assert_eq!(a.properties.len(), 2);
        assert_eq!(
            a.property("x").unwrap().value,
            Value::Scalar(Scalar::Number("3".to_string()))
        );
    }

    #[test]
    fn plain_assign_after_append_replaces() {
        let forest = parse("class A { f[] += {\"a\"}; f[] = {\"b\"}; };");
        let f = forest[0].property("f").unwrap();
        assert!(!f.append);
        assert_eq!(f.value, strings(&["b"]));
    }

    #[test]
    fn chained_appends_accumulate() {
        let forest = parse("class A { f[] += {\"a\"}; f[] += {\"b\"}; };");
        let f = forest[0].property("f").unwrap();
        assert!(f.append);
        assert_eq!(f.value, strings(&["a", "b"]));
    }

    #[test]
    fn append_after_assign_extends_assignment() {
        let forest = parse("class A { f[] = {\"a\"}; f[] += {\"b\"}; };");
        let f = forest[0].property("f").unwrap();
        assert!(!f.append);
        assert_eq!(f.value, strings(&["a", "b"]));
    }

    #[test]
    fn body_supersedes_forward_declaration() {
        let forest = parse("class A { class B; class B { x = 1; }; class C { y = 1; }; class C; };");
        let b = forest[0].child("B").unwrap();
        assert!(!b.forward);
        assert!(b.property("x").is_some());
        let c = forest[0].child("C").unwrap();
        assert!(!c.forward);
        assert!(c.property("y").is_some());
    }

    // -----------------------------------------------------------------------
    // Errors
    // -----------------------------------------------------------------------

    #[test]
    fn unclosed_brace_reports_opening_position() {
        let err = parse_fragment("class A\n{\n  x = 1;\n").expect_err("should fail");
        assert_eq!(
            err.kind,
            ParseErrorKind::UnbalancedBraces("'{' is never closed")
        );
        assert_eq!(err.position.line, 2);
    }

    #[test]
    fn stray_closing_brace() {
        assert!(matches!(
            err_kind("class A {}; };"),
            ParseErrorKind::UnbalancedBraces(_)
        ));
    }

    #[test]
    fn missing_semicolon() {
        assert!(matches!(
            err_kind("class A { x = 1 };"),
            ParseErrorKind::UnexpectedToken { expected: "';'", .. }
        ));
    }

    #[test]
    fn missing_semicolon_between_classes() {
        assert!(matches!(
            err_kind("class A {} class B {};"),
            ParseErrorKind::UnexpectedToken { .. }
        ));
    }

    #[test]
    fn append_on_scalar_is_rejected() {
        assert_eq!(
            err_kind("class A { x += 1; };"),
            ParseErrorKind::AppendOnScalar("x".to_string())
        );
    }

    #[test]
    fn repeated_append_marker_is_rejected() {
        assert_eq!(
            err_kind("class A { f[] += += {\"a\"}; };"),
            ParseErrorKind::RepeatedAppendMarker("f".to_string())
        );
    }

    #[test]
    fn top_level_property_is_rejected() {
        assert!(matches!(
            err_kind("x = 1;"),
            ParseErrorKind::UnexpectedToken {
                expected: "'class'",
                ..
            }
        ));
    }

    #[test]
    fn bare_word_value_is_rejected() {
        assert!(matches!(
            err_kind("class A { x = foo; };"),
            ParseErrorKind::UnexpectedToken { .. }
        ));
    }

    #[test]
    fn nested_array_is_rejected() {
        assert!(matches!(
            err_kind("class A { x[] = {{1}}; };"),
            ParseErrorKind::UnexpectedToken { .. }
        ));
    }

    #[test]
    fn truncated_input() {
        assert_eq!(
            err_kind("class A { x = "),
            ParseErrorKind::UnexpectedEof {
                expected: "number, string or boolean"
            }
        );
    }

    #[test]
    fn forward_declaration_cannot_have_base() {
        assert!(matches!(
            err_kind("class A { class B: C; };"),
            ParseErrorKind::UnexpectedToken { .. }
        ));
    }
}
