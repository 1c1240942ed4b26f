//! Path expression parser
//!
//! Builds a compiled `PathExpr` from token input. All static checks happen
//! here: grammar shape, prefix resolution against the declare preamble, and
//! predicate well-formedness. Evaluation never fails.

use std::collections::HashMap;

use crate::error::PathError;
use crate::store::namespace::ns;

use super::lexer::{Lexer, Token};

/// A compiled expression: a union of one or more path branches.
#[derive(Debug, Clone, PartialEq)]
pub struct PathExpr {
    pub(crate) branches: Vec<PathBranch>,
}

/// One `|` alternative.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PathBranch {
    /// Starts from the document container instead of the origin.
    pub absolute: bool,
    pub steps: Vec<Step>,
}

/// One `/` or `//` step.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Step {
    /// Reached by `//`: search all content descendants, not just children.
    pub descend: bool,
    pub test: NodeTest,
    pub predicates: Vec<Predicate>,
}

/// What a step matches.
///
/// For name tests, `uri: None` accepts any namespace and `local: None` any
/// local name. A bare name compiles to `uri: Some("")`; names only match in
/// a namespace when the expression asks for one.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum NodeTest {
    SelfNode,
    ParentNode,
    Element {
        uri: Option<String>,
        local: Option<String>,
    },
    Attribute {
        uri: Option<String>,
        local: Option<String>,
    },
    Text,
    Comment,
    AnyNode,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Predicate {
    /// `[n]`, counting matches under one context node from 1.
    Index(usize),
    /// `[@name='value']` on the candidate's attribute area.
    AttrEquals {
        uri: String,
        local: String,
        value: String,
    },
}

impl PathExpr {
    /// Compile an expression: optional declare preamble, then a union of
    /// paths. Every error the expression can produce is raised here.
    pub fn compile(text: &str) -> Result<PathExpr, PathError> {
        let mut parser = Parser::new(text)?;
        let bindings = parser.parse_preamble()?;
        let expr = parser.parse_union(&bindings)?;
        parser.finish()?;
        Ok(expr)
    }
}

/// Path parser
struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
    current_at: usize,
    peeked: Option<(Token, usize)>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Result<Self, PathError> {
        let mut lexer = Lexer::new(input);
        let (current, current_at) = lexer.next_token()?;
        Ok(Parser {
            lexer,
            current,
            current_at,
            peeked: None,
        })
    }

    /// Move to the next token
    fn advance(&mut self) -> Result<(), PathError> {
        let (token, at) = match self.peeked.take() {
            Some(entry) => entry,
            None => self.lexer.next_token()?,
        };
        self.current = token;
        self.current_at = at;
        Ok(())
    }

    /// Look at the token after the current one
    fn peek(&mut self) -> Result<Token, PathError> {
        if self.peeked.is_none() {
            self.peeked = Some(self.lexer.next_token()?);
        }
        match &self.peeked {
            Some((token, _)) => Ok(token.clone()),
            None => Ok(Token::Eof),
        }
    }

    fn expect(&mut self, token: Token, what: &'static str) -> Result<(), PathError> {
        if self.current == token {
            self.advance()
        } else {
            Err(PathError::syntax(what, self.current_at))
        }
    }

    /// Parse `declare namespace p='uri';` bindings.
    fn parse_preamble(&mut self) -> Result<HashMap<String, String>, PathError> {
        let mut bindings = HashMap::new();
        loop {
            let declares = matches!(&self.current, Token::Name(n) if n == "declare")
                && matches!(self.peek()?, Token::Name(n) if n == "namespace");
            if !declares {
                return Ok(bindings);
            }
            self.advance()?;
            self.advance()?;

            let at = self.current_at;
            let prefix = match &self.current {
                Token::Name(p) => p.clone(),
                _ => return Err(PathError::syntax("expected a namespace prefix", at)),
            };
            self.advance()?;
            self.expect(Token::Eq, "expected '=' in namespace declaration")?;
            let uri = match &self.current {
                Token::Literal(u) => u.clone(),
                _ => {
                    return Err(PathError::syntax(
                        "expected a quoted namespace uri",
                        self.current_at,
                    ))
                }
            };
            self.advance()?;
            self.expect(Token::Semi, "expected ';' after namespace declaration")?;

            if bindings.insert(prefix.clone(), uri).is_some() {
                return Err(PathError::syntax(
                    format!("prefix {prefix:?} declared twice"),
                    at,
                ));
            }
        }
    }

    fn parse_union(&mut self, ns: &HashMap<String, String>) -> Result<PathExpr, PathError> {
        let mut branches = vec![self.parse_branch(ns)?];
        while self.current == Token::Pipe {
            self.advance()?;
            branches.push(self.parse_branch(ns)?);
        }
        Ok(PathExpr { branches })
    }

    fn parse_branch(&mut self, ns: &HashMap<String, String>) -> Result<PathBranch, PathError> {
        let mut steps = Vec::new();
        let absolute = matches!(self.current, Token::Slash | Token::DoubleSlash);

        let first_descends = match self.current {
            Token::Slash => {
                self.advance()?;
                // A bare "/" selects the document container itself.
                if !self.at_step_start() {
                    return Ok(PathBranch { absolute, steps });
                }
                false
            }
            Token::DoubleSlash => {
                self.advance()?;
                true
            }
            _ => false,
        };

        steps.push(self.parse_step(first_descends, ns)?);
        loop {
            let descend = match self.current {
                Token::Slash => false,
                Token::DoubleSlash => true,
                _ => break,
            };
            self.advance()?;
            steps.push(self.parse_step(descend, ns)?);
        }
        Ok(PathBranch { absolute, steps })
    }

    fn at_step_start(&self) -> bool {
        matches!(
            self.current,
            Token::Dot
                | Token::DotDot
                | Token::At
                | Token::Star
                | Token::Name(_)
                | Token::Prefixed(..)
                | Token::PrefixStar(_)
                | Token::NodeType(_)
        )
    }

    fn parse_step(&mut self, descend: bool, ns: &HashMap<String, String>) -> Result<Step, PathError> {
        let test = match self.current.clone() {
            Token::Dot => {
                self.advance()?;
                NodeTest::SelfNode
            }
            Token::DotDot => {
                self.advance()?;
                NodeTest::ParentNode
            }
            Token::At => {
                self.advance()?;
                let (uri, local) = self.parse_name_test(ns)?;
                NodeTest::Attribute { uri, local }
            }
            Token::NodeType(kind) => {
                self.advance()?;
                self.expect(Token::LParen, "expected '(' after node type")?;
                self.expect(Token::RParen, "expected ')' after node type")?;
                match kind.as_str() {
                    "text" => NodeTest::Text,
                    "comment" => NodeTest::Comment,
                    _ => NodeTest::AnyNode,
                }
            }
            Token::Star | Token::Name(_) | Token::Prefixed(..) | Token::PrefixStar(_) => {
                let (uri, local) = self.parse_name_test(ns)?;
                NodeTest::Element { uri, local }
            }
            _ => {
                return Err(PathError::syntax(
                    "expected a name test or kind test",
                    self.current_at,
                ))
            }
        };

        let mut predicates = Vec::new();
        while self.current == Token::LBracket {
            self.advance()?;
            predicates.push(self.parse_predicate(ns)?);
            self.expect(Token::RBracket, "expected ']' after predicate")?;
        }

        Ok(Step {
            descend,
            test,
            predicates,
        })
    }

    /// Parse a name test and resolve its prefix. `None` parts are wildcards.
    fn parse_name_test(
        &mut self,
        ns: &HashMap<String, String>,
    ) -> Result<(Option<String>, Option<String>), PathError> {
        let at = self.current_at;
        let parts = match self.current.clone() {
            Token::Star => (None, None),
            Token::Name(local) => (Some(String::new()), Some(local)),
            Token::Prefixed(prefix, local) => (Some(resolve(ns, &prefix)?), Some(local)),
            Token::PrefixStar(prefix) => (Some(resolve(ns, &prefix)?), None),
            _ => return Err(PathError::syntax("expected a name test", at)),
        };
        self.advance()?;
        Ok(parts)
    }

    fn parse_predicate(&mut self, ns: &HashMap<String, String>) -> Result<Predicate, PathError> {
        match self.current.clone() {
            Token::Number(n) => {
                if n == 0 {
                    return Err(PathError::syntax(
                        "positions count from 1",
                        self.current_at,
                    ));
                }
                self.advance()?;
                Ok(Predicate::Index(n))
            }
            Token::At => {
                self.advance()?;
                let at = self.current_at;
                let (uri, local) = match self.parse_name_test(ns)? {
                    (Some(uri), Some(local)) => (uri, local),
                    _ => {
                        return Err(PathError::syntax(
                            "attribute comparisons need a full name",
                            at,
                        ))
                    }
                };
                self.expect(Token::Eq, "expected '=' in attribute comparison")?;
                let value = match &self.current {
                    Token::Literal(v) => v.clone(),
                    _ => {
                        return Err(PathError::syntax(
                            "expected a quoted string",
                            self.current_at,
                        ))
                    }
                };
                self.advance()?;
                Ok(Predicate::AttrEquals { uri, local, value })
            }
            _ => Err(PathError::syntax(
                "expected a number or attribute comparison",
                self.current_at,
            )),
        }
    }

    fn finish(&mut self) -> Result<(), PathError> {
        if self.current == Token::Eof {
            Ok(())
        } else {
            Err(PathError::syntax("unexpected trailing input", self.current_at))
        }
    }
}

/// Resolve a prefix against the preamble; `xml` is always bound.
fn resolve(ns: &HashMap<String, String>, prefix: &str) -> Result<String, PathError> {
    if let Some(uri) = ns.get(prefix) {
        return Ok(uri.clone());
    }
    if prefix == ns::XML_PREFIX {
        return Ok(ns::XML_URI.to_string());
    }
    Err(PathError::UnboundPrefix(prefix.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn element(uri: &str, local: &str) -> NodeTest {
        NodeTest::Element {
            uri: Some(uri.to_string()),
            local: Some(local.to_string()),
        }
    }

    fn step(descend: bool, test: NodeTest) -> Step {
        Step {
            descend,
            test,
            predicates: Vec::new(),
        }
    }

    #[test]
    fn test_compile_relative_and_absolute() {
        let expr = PathExpr::compile("a/b").unwrap();
        assert_eq!(
            expr.branches,
            vec![PathBranch {
                absolute: false,
                steps: vec![step(false, element("", "a")), step(false, element("", "b"))],
            }]
        );

        let expr = PathExpr::compile("/a//b").unwrap();
        assert_eq!(
            expr.branches,
            vec![PathBranch {
                absolute: true,
                steps: vec![step(false, element("", "a")), step(true, element("", "b"))],
            }]
        );
    }

    #[test]
    fn test_compile_root_alone() {
        let expr = PathExpr::compile("/").unwrap();
        assert_eq!(
            expr.branches,
            vec![PathBranch {
                absolute: true,
                steps: Vec::new(),
            }]
        );
        // "//" needs a step to apply to.
        assert_matches!(PathExpr::compile("//"), Err(PathError::Syntax { .. }));
    }

    #[test]
    fn test_compile_self_parent_and_kinds() {
        let expr = PathExpr::compile("./..//text()").unwrap();
        assert_eq!(
            expr.branches[0].steps,
            vec![
                step(false, NodeTest::SelfNode),
                step(false, NodeTest::ParentNode),
                step(true, NodeTest::Text),
            ]
        );
        let expr = PathExpr::compile("node()").unwrap();
        assert_eq!(expr.branches[0].steps[0].test, NodeTest::AnyNode);
        let expr = PathExpr::compile("comment()").unwrap();
        assert_eq!(expr.branches[0].steps[0].test, NodeTest::Comment);
    }

    #[test]
    fn test_compile_attribute_tests() {
        let expr = PathExpr::compile("item/@id").unwrap();
        assert_eq!(
            expr.branches[0].steps[1].test,
            NodeTest::Attribute {
                uri: Some(String::new()),
                local: Some("id".to_string()),
            }
        );
        let expr = PathExpr::compile("@*").unwrap();
        assert_eq!(
            expr.branches[0].steps[0].test,
            NodeTest::Attribute {
                uri: None,
                local: None,
            }
        );
    }

    #[test]
    fn test_preamble_binds_prefixes() {
        let expr = PathExpr::compile("declare namespace p='urn:x'; .//p:item").unwrap();
        assert_eq!(
            expr.branches[0].steps,
            vec![
                step(false, NodeTest::SelfNode),
                step(true, element("urn:x", "item")),
            ]
        );

        let expr =
            PathExpr::compile("declare namespace a='u1'; declare namespace b='u2'; a:x/b:*")
                .unwrap();
        assert_eq!(
            expr.branches[0].steps,
            vec![
                step(false, element("u1", "x")),
                step(
                    false,
                    NodeTest::Element {
                        uri: Some("u2".to_string()),
                        local: None,
                    }
                ),
            ]
        );
    }

    #[test]
    fn test_xml_prefix_is_implicit() {
        let expr = PathExpr::compile("@xml:lang").unwrap();
        assert_eq!(
            expr.branches[0].steps[0].test,
            NodeTest::Attribute {
                uri: Some(ns::XML_URI.to_string()),
                local: Some("lang".to_string()),
            }
        );
    }

    #[test]
    fn test_unbound_prefix_rejected() {
        assert_eq!(
            PathExpr::compile("p:item"),
            Err(PathError::UnboundPrefix("p".to_string()))
        );
        assert_eq!(
            PathExpr::compile("item[@q:id='x']"),
            Err(PathError::UnboundPrefix("q".to_string()))
        );
    }

    #[test]
    fn test_union_branches() {
        let expr = PathExpr::compile("a | /b | .").unwrap();
        assert_eq!(expr.branches.len(), 3);
        assert!(!expr.branches[0].absolute);
        assert!(expr.branches[1].absolute);
        assert_eq!(expr.branches[2].steps[0].test, NodeTest::SelfNode);
    }

    #[test]
    fn test_predicates() {
        let expr = PathExpr::compile("item[2]").unwrap();
        assert_eq!(
            expr.branches[0].steps[0].predicates,
            vec![Predicate::Index(2)]
        );

        let expr = PathExpr::compile("item[@id='a1'][1]").unwrap();
        assert_eq!(
            expr.branches[0].steps[0].predicates,
            vec![
                Predicate::AttrEquals {
                    uri: String::new(),
                    local: "id".to_string(),
                    value: "a1".to_string(),
                },
                Predicate::Index(1),
            ]
        );
    }

    #[test]
    fn test_syntax_rejections() {
        assert_matches!(PathExpr::compile(""), Err(PathError::Syntax { .. }));
        assert_matches!(PathExpr::compile("item["), Err(PathError::Syntax { .. }));
        assert_matches!(PathExpr::compile("item[0]"), Err(PathError::Syntax { .. }));
        assert_matches!(PathExpr::compile("item[@*='x']"), Err(PathError::Syntax { .. }));
        assert_matches!(PathExpr::compile("a b"), Err(PathError::Syntax { .. }));
        assert_matches!(PathExpr::compile("a/"), Err(PathError::Syntax { .. }));
        assert_matches!(
            PathExpr::compile("declare namespace p='u'; declare namespace p='v'; p:a"),
            Err(PathError::Syntax { .. })
        );
        assert_matches!(PathExpr::compile("text(str)"), Err(PathError::Syntax { .. }));
    }
}
