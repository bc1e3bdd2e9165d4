//! Model expression trees and the compositional-expression parser.
//!
//! This module turns a compositional string expression such as
//!
//! ```text
//! S0 * ( (Weight(w_ball) * Ball) +
//!        (Weight(w_stick) * Stick) )
//! ```
//!
//! into a [`ModelTree`]: leaves are [`Compartment`] instances resolved
//! against the compartment registry, internal nodes carry a [`TreeOp`]
//! (`+` or `*`) with at least two children.
//!
//! Key ideas:
//! - Operands are compartment references, optionally with an explicit
//!   instance alias: `Stick(Stick0)` instantiates the `Stick` primitive
//!   under the namespace `Stick0`.
//! - `*` binds tighter than `+`; parentheses are explicit and respected.
//! - Same-operator nodes produced by chains like `A + B + C` are flattened
//!   into a single node with three children, so the output invariant
//!   "every internal node has ≥ 2 children" holds by construction.
//! - Unresolved compartment names fail with
//!   [`CompositionError::UnknownCompartment`] at parse time, before any
//!   optimizer involvement.
use crate::{
    composition::{
        core::compartments::Compartment,
        errors::{CompositionResult, ExprError, ExprResult},
    },
    registry::CompartmentRegistry,
};

/// Operator of an internal [`ModelTree`] node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeOp {
    /// Signal summation (`+`).
    Add,
    /// Signal product (`*`).
    Mul,
}

/// A model expression tree.
///
/// Acyclic and of finite depth by construction; evaluated bottom-up as
/// nested scalar arithmetic over the diffusion signal equation (see
/// [`fitting::signal`](crate::fitting::signal)).
#[derive(Debug, Clone, PartialEq)]
pub enum ModelTree {
    /// A compartment instance.
    Leaf(Compartment),
    /// An operator over ≥ 2 children.
    Node { op: TreeOp, children: Vec<ModelTree> },
}

impl ModelTree {
    /// Join `children` under `op`, flattening nested nodes with the same
    /// operator and collapsing single-child joins.
    fn join(op: TreeOp, children: Vec<ModelTree>) -> ModelTree {
        let mut flat = Vec::with_capacity(children.len());
        for child in children {
            match child {
                ModelTree::Node { op: child_op, children: grand } if child_op == op => {
                    flat.extend(grand);
                }
                other => flat.push(other),
            }
        }
        if flat.len() == 1 {
            flat.remove(0)
        } else {
            ModelTree::Node { op, children: flat }
        }
    }

    /// All leaves in left-to-right traversal order.
    ///
    /// This order is load-bearing: the dependency resolver picks the first
    /// `Weight` leaf in this order as the sum-to-one reference weight.
    pub fn leaves(&self) -> Vec<&Compartment> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a Compartment>) {
        match self {
            ModelTree::Leaf(compartment) => out.push(compartment),
            ModelTree::Node { children, .. } => {
                for child in children {
                    child.collect_leaves(out);
                }
            }
        }
    }

    /// Qualified names of every parameter reachable from the tree, in
    /// leaf-traversal order.
    pub fn parameter_names(&self) -> Vec<String> {
        self.leaves().iter().flat_map(|c| c.qualified_names()).collect()
    }
}

// ---- Tokenizer -------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum TokenKind {
    Ident(String),
    Plus,
    Star,
    LParen,
    RParen,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Token {
    kind: TokenKind,
    position: usize,
}

fn tokenize(expression: &str) -> ExprResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = expression.char_indices().peekable();
    while let Some(&(position, character)) = chars.peek() {
        match character {
            c if c.is_whitespace() => {
                chars.next();
            }
            '+' => {
                chars.next();
                tokens.push(Token { kind: TokenKind::Plus, position });
            }
            '*' => {
                chars.next();
                tokens.push(Token { kind: TokenKind::Star, position });
            }
            '(' => {
                chars.next();
                tokens.push(Token { kind: TokenKind::LParen, position });
            }
            ')' => {
                chars.next();
                tokens.push(Token { kind: TokenKind::RParen, position });
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token { kind: TokenKind::Ident(ident), position });
            }
            c => {
                return Err(ExprError::UnexpectedCharacter { position, character: c });
            }
        }
    }
    if tokens.is_empty() {
        return Err(ExprError::Empty);
    }
    Ok(tokens)
}

// ---- Parser ----------------------------------------------------------------

/// Recursive-descent parser over the token stream.
///
/// Grammar (`*` binds tighter than `+`):
///
/// ```text
/// expr   := term { '+' term }
/// term   := factor { '*' factor }
/// factor := IDENT [ '(' IDENT ')' ]      -- compartment, optional alias
///         | '(' expr ')'
/// ```
struct Parser<'a> {
    tokens: Vec<Token>,
    cursor: usize,
    registry: &'a CompartmentRegistry,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.cursor)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.cursor).cloned();
        if token.is_some() {
            self.cursor += 1;
        }
        token
    }

    fn describe(kind: &TokenKind) -> String {
        match kind {
            TokenKind::Ident(name) => name.clone(),
            TokenKind::Plus => "+".to_string(),
            TokenKind::Star => "*".to_string(),
            TokenKind::LParen => "(".to_string(),
            TokenKind::RParen => ")".to_string(),
        }
    }

    fn expr(&mut self) -> CompositionResult<ModelTree> {
        let mut terms = vec![self.term()?];
        while matches!(self.peek(), Some(Token { kind: TokenKind::Plus, .. })) {
            self.bump();
            terms.push(self.term()?);
        }
        Ok(ModelTree::join(TreeOp::Add, terms))
    }

    fn term(&mut self) -> CompositionResult<ModelTree> {
        let mut factors = vec![self.factor()?];
        while matches!(self.peek(), Some(Token { kind: TokenKind::Star, .. })) {
            self.bump();
            factors.push(self.factor()?);
        }
        Ok(ModelTree::join(TreeOp::Mul, factors))
    }

    fn factor(&mut self) -> CompositionResult<ModelTree> {
        match self.bump() {
            Some(Token { kind: TokenKind::Ident(name), .. }) => {
                // Optional instance alias: `Stick(Stick0)`.
                let mut alias = None;
                if let Some(open) =
                    self.peek().filter(|t| t.kind == TokenKind::LParen).cloned()
                {
                    self.bump();
                    match self.bump() {
                        Some(Token { kind: TokenKind::Ident(inner), .. }) => {
                            match self.bump() {
                                Some(Token { kind: TokenKind::RParen, .. }) => {
                                    alias = Some(inner);
                                }
                                Some(token) => {
                                    return Err(ExprError::UnexpectedToken {
                                        position: token.position,
                                        found: Parser::describe(&token.kind),
                                    }
                                    .into());
                                }
                                None => return Err(ExprError::UnexpectedEnd.into()),
                            }
                        }
                        Some(token) => {
                            return Err(ExprError::UnexpectedToken {
                                position: token.position,
                                found: Parser::describe(&token.kind),
                            }
                            .into());
                        }
                        None => {
                            return Err(ExprError::UnbalancedParenthesis {
                                position: open.position,
                            }
                            .into());
                        }
                    }
                }
                let compartment = self.registry.load_as(&name, alias.as_deref())?;
                Ok(ModelTree::Leaf(compartment))
            }
            Some(Token { kind: TokenKind::LParen, position }) => {
                let inner = self.expr()?;
                match self.bump() {
                    Some(Token { kind: TokenKind::RParen, .. }) => Ok(inner),
                    Some(token) => Err(ExprError::UnexpectedToken {
                        position: token.position,
                        found: Parser::describe(&token.kind),
                    }
                    .into()),
                    None => Err(ExprError::UnbalancedParenthesis { position }.into()),
                }
            }
            Some(token) => Err(ExprError::UnexpectedToken {
                position: token.position,
                found: Parser::describe(&token.kind),
            }
            .into()),
            None => Err(ExprError::UnexpectedEnd.into()),
        }
    }
}

/// Parse a compositional model expression into a [`ModelTree`].
///
/// ## Arguments
/// - `expression`: the compositional string; whitespace (including
///   newlines) is insignificant.
/// - `registry`: compartment catalog against which every operand is
///   resolved.
///
/// ## Errors
/// - `CompositionError::Syntax` for malformed expressions (see
///   [`ExprError`]).
/// - `CompositionError::UnknownCompartment` for operands not present in
///   the registry.
pub fn parse_expression(
    expression: &str, registry: &CompartmentRegistry,
) -> CompositionResult<ModelTree> {
    let tokens = tokenize(expression)?;
    let mut parser = Parser { tokens, cursor: 0, registry };
    let tree = parser.expr()?;
    if let Some(token) = parser.peek() {
        return Err(ExprError::TrailingInput {
            position: token.position,
            found: Parser::describe(&token.kind),
        }
        .into());
    }
    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        composition::{core::compartments::CompartmentKind, errors::CompositionError},
        registry::CompartmentRegistry,
    };

    fn registry() -> CompartmentRegistry {
        CompartmentRegistry::builtin()
    }

    #[test]
    // Purpose
    // -------
    // `*` binds tighter than `+`: `S0 * Ball + Stick` must parse as
    // `(S0 * Ball) + Stick`, not `S0 * (Ball + Stick)`.
    //
    // Given
    // -----
    // - The expression `S0 * Ball + Stick` with no parentheses.
    //
    // Expect
    // ------
    // - Root is an `Add` node with two children; the first child is a
    //   `Mul` node over `S0` and `Ball`.
    fn product_binds_tighter_than_sum() {
        // Arrange & Act
        let tree = parse_expression("S0 * Ball + Stick", &registry()).unwrap();

        // Assert
        match &tree {
            ModelTree::Node { op: TreeOp::Add, children } => {
                assert_eq!(children.len(), 2);
                match &children[0] {
                    ModelTree::Node { op: TreeOp::Mul, children: factors } => {
                        assert_eq!(factors.len(), 2);
                    }
                    other => panic!("expected Mul node, got: {other:?}"),
                }
                assert!(matches!(&children[1], ModelTree::Leaf(c) if c.instance() == "Stick"));
            }
            other => panic!("expected Add root, got: {other:?}"),
        }
    }

    #[test]
    // Purpose
    // -------
    // Explicit parentheses override precedence.
    fn parentheses_override_precedence() {
        // Arrange & Act
        let tree = parse_expression("S0 * (Ball + Stick)", &registry()).unwrap();

        // Assert
        match &tree {
            ModelTree::Node { op: TreeOp::Mul, children } => {
                assert_eq!(children.len(), 2);
                assert!(matches!(
                    &children[1],
                    ModelTree::Node { op: TreeOp::Add, .. }
                ));
            }
            other => panic!("expected Mul root, got: {other:?}"),
        }
    }

    #[test]
    // Purpose
    // -------
    // Operator chains flatten: `Ball + Stick + Tensor` yields one Add node
    // with three children, so every internal node has ≥ 2 children.
    fn same_operator_chains_flatten() {
        // Arrange & Act
        let tree = parse_expression("Ball + Stick + Tensor", &registry()).unwrap();

        // Assert
        match &tree {
            ModelTree::Node { op: TreeOp::Add, children } => assert_eq!(children.len(), 3),
            other => panic!("expected flattened Add node, got: {other:?}"),
        }
    }

    #[test]
    // Purpose
    // -------
    // Aliased operands resolve to independently named instances, in
    // left-to-right leaf order.
    fn aliases_produce_independent_instances_in_traversal_order() {
        // Arrange
        let expression = "S0 * ( (Weight(w_stick0) * Stick(Stick0)) +
                                (Weight(w_stick1) * Stick(Stick1)) )";

        // Act
        let tree = parse_expression(expression, &registry()).unwrap();
        let leaves = tree.leaves();
        let instances: Vec<&str> = leaves.iter().map(|c| c.instance()).collect();

        // Assert
        assert_eq!(instances, vec!["S0", "w_stick0", "Stick0", "w_stick1", "Stick1"]);
        assert!(leaves[1].is_weight());
        assert_eq!(leaves[2].kind(), CompartmentKind::Stick);
        assert!(tree.parameter_names().contains(&"Stick1.d".to_string()));
    }

    #[test]
    // Purpose
    // -------
    // Unresolved compartment names fail fast with `UnknownCompartment`.
    fn unknown_compartment_fails_fast() {
        // Arrange & Act
        let result = parse_expression("S0 * Blob", &registry());

        // Assert
        match result {
            Err(CompositionError::UnknownCompartment { name }) => assert_eq!(name, "Blob"),
            other => panic!("expected UnknownCompartment error, got: {other:?}"),
        }
    }

    #[test]
    // Purpose
    // -------
    // Syntax failures are reported as structured `ExprError`s: empty
    // input, dangling operators, unbalanced parentheses, trailing input,
    // and stray characters.
    fn syntax_errors_are_structured() {
        let reg = registry();
        assert!(matches!(
            parse_expression("   ", &reg),
            Err(CompositionError::Syntax(ExprError::Empty))
        ));
        assert!(matches!(
            parse_expression("Ball +", &reg),
            Err(CompositionError::Syntax(ExprError::UnexpectedEnd))
        ));
        assert!(matches!(
            parse_expression("(Ball + Stick", &reg),
            Err(CompositionError::Syntax(ExprError::UnbalancedParenthesis { .. }))
        ));
        assert!(matches!(
            parse_expression("Ball Stick", &reg),
            Err(CompositionError::Syntax(ExprError::TrailingInput { .. }))
        ));
        assert!(matches!(
            parse_expression("Ball % Stick", &reg),
            Err(CompositionError::Syntax(ExprError::UnexpectedCharacter { .. }))
        ));
    }
}
