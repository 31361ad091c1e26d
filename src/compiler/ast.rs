use super::source::Span;
use std::fmt::Write;

/// An expression node together with the source it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub expr: Expr,
    pub span: Span,
}

/// Expression kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Float(f64),
    Variable(String),
    Call { name: String, args: Vec<Node> },
    Add(Box<Node>, Box<Node>),
    Sub(Box<Node>, Box<Node>),
    Mul(Box<Node>, Box<Node>),
    Div(Box<Node>, Box<Node>),
    Neg(Box<Node>),
    Plus(Box<Node>),
    /// Evaluates the left side for its effects, yields the right side.
    Combine(Box<Node>, Box<Node>),
}

impl Node {
    pub fn new(expr: Expr, span: Span) -> Self {
        Self { expr, span }
    }

    pub fn float(value: f64, span: Span) -> Self {
        Self::new(Expr::Float(value), span)
    }

    pub fn variable(name: impl Into<String>, span: Span) -> Self {
        Self::new(Expr::Variable(name.into()), span)
    }

    pub fn call(name: impl Into<String>, args: Vec<Node>, span: Span) -> Self {
        Self::new(
            Expr::Call {
                name: name.into(),
                args,
            },
            span,
        )
    }

    pub fn combine(first: Node, second: Node) -> Self {
        let span = first.span.merge(second.span);
        Self::new(Expr::Combine(Box::new(first), Box::new(second)), span)
    }

    /// Number of nodes in the tree.
    pub fn size(&self) -> usize {
        1 + match &self.expr {
            Expr::Float(_) | Expr::Variable(_) => 0,
            Expr::Call { args, .. } => args.iter().map(Node::size).sum(),
            Expr::Add(l, r)
            | Expr::Sub(l, r)
            | Expr::Mul(l, r)
            | Expr::Div(l, r)
            | Expr::Combine(l, r) => l.size() + r.size(),
            Expr::Neg(e) | Expr::Plus(e) => e.size(),
        }
    }
}

/// Render the tree one node per line.
pub fn dump(root: &Node) -> String {
    let mut out = String::new();
    dump_node(&mut out, root, "", "");
    out
}

fn dump_node(out: &mut String, node: &Node, prefix: &str, child_prefix: &str) {
    let children: Vec<&Node> = match &node.expr {
        Expr::Float(v) => {
            let _ = writeln!(out, "{}Float {}", prefix, v);
            Vec::new()
        }
        Expr::Variable(name) => {
            let _ = writeln!(out, "{}Variable {}", prefix, name);
            Vec::new()
        }
        Expr::Call { name, args } => {
            let _ = writeln!(out, "{}Call {}/{}", prefix, name, args.len());
            args.iter().collect()
        }
        Expr::Add(l, r) => labelled(out, prefix, "Add", &[&**l, &**r]),
        Expr::Sub(l, r) => labelled(out, prefix, "Sub", &[&**l, &**r]),
        Expr::Mul(l, r) => labelled(out, prefix, "Mul", &[&**l, &**r]),
        Expr::Div(l, r) => labelled(out, prefix, "Div", &[&**l, &**r]),
        Expr::Combine(l, r) => labelled(out, prefix, "Combine", &[&**l, &**r]),
        Expr::Neg(e) => labelled(out, prefix, "Neg", &[&**e]),
        Expr::Plus(e) => labelled(out, prefix, "Plus", &[&**e]),
    };

    for (i, child) in children.iter().enumerate() {
        let last = i + 1 == children.len();
        let (branch, next) = if last {
            ("└── ", "    ")
        } else {
            ("├── ", "│   ")
        };
        dump_node(
            out,
            child,
            &format!("{}{}", child_prefix, branch),
            &format!("{}{}", child_prefix, next),
        );
    }
}

fn labelled<'a>(out: &mut String, prefix: &str, label: &str, nodes: &[&'a Node]) -> Vec<&'a Node> {
    let _ = writeln!(out, "{}{}", prefix, label);
    nodes.to_vec()
}
