use crate::span::Span;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Script {
    pub directives: Vec<Directive>,
    pub items: Vec<Item>,
}

impl Script {
    /// The expression whose value the script produces, if the last item
    /// is an expression without a terminating `;`.
    pub fn trailing_value(&self) -> Option<&Expr> {
        match self.items.last() {
            Some(Item::Expr {
                expr,
                terminated: false,
            }) => Some(expr),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// `#r "path"`
    Reference { path: String, span: Span },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    /// `int name = value;`
    Declare { name: Ident, value: Expr },
    /// `name = value;`
    Assign { name: Ident, value: Expr },
    Expr { expr: Expr, terminated: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprKind {
    Int(i32),
    Name(String),
    /// `path(args)`; every segment but the last names the library.
    Call { path: Vec<Ident>, args: Vec<Expr> },
    Neg(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    pub fn is_const_zero(&self) -> bool {
        matches!(self.kind, ExprKind::Int(0))
    }
}
