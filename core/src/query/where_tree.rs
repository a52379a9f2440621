use super::fragment::{Fragment, RenderCx};
use crate::error::Result;
use crate::sql::SQL;

/// How a node combines with the sibling before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Sep {
    And,
    Or,
}

impl Sep {
    fn keyword(self) -> &'static str {
        match self {
            Sep::And => " AND ",
            Sep::Or => " OR ",
        }
    }
}

/// One condition or a parenthesized group of conditions.
#[derive(Debug, Clone)]
pub(crate) enum WhereNode {
    Cond {
        sep: Sep,
        fragment: Fragment,
    },
    Group {
        sep: Sep,
        negate: bool,
        children: Vec<WhereNode>,
    },
}

impl WhereNode {
    fn sep(&self) -> Sep {
        match self {
            WhereNode::Cond { sep, .. } | WhereNode::Group { sep, .. } => *sep,
        }
    }

    fn is_empty(&self) -> bool {
        matches!(self, WhereNode::Group { children, .. } if children.iter().all(WhereNode::is_empty))
    }
}

/// Renders sibling nodes; every condition is parenthesized, empty groups are skipped.
pub(crate) fn render_nodes(nodes: &[WhereNode], cx: RenderCx<'_>, out: &mut SQL) -> Result<()> {
    let mut first = true;
    for node in nodes.iter().filter(|node| !node.is_empty()) {
        if !first {
            out.push_raw(node.sep().keyword());
        }
        first = false;
        match node {
            WhereNode::Cond { fragment, .. } => {
                out.push_raw("(");
                fragment.render(cx, out)?;
                out.push_raw(")");
            }
            WhereNode::Group {
                negate, children, ..
            } => {
                if *negate {
                    out.push_raw("NOT ");
                }
                out.push_raw("(");
                render_nodes(children, cx, out)?;
                out.push_raw(")");
            }
        }
    }
    Ok(())
}

/// Number of nodes that will actually render.
pub(crate) fn visible_len(nodes: &[WhereNode]) -> usize {
    nodes.iter().filter(|node| !node.is_empty()).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn cond(sep: Sep, expr: &str) -> WhereNode {
        WhereNode::Cond {
            sep,
            fragment: Fragment::from(expr),
        }
    }

    #[test]
    fn groups_nest_with_parentheses() {
        let nodes = vec![
            cond(Sep::And, "a"),
            WhereNode::Group {
                sep: Sep::And,
                negate: false,
                children: vec![
                    cond(Sep::And, "b"),
                    WhereNode::Group {
                        sep: Sep::Or,
                        negate: true,
                        children: vec![cond(Sep::And, "c"), cond(Sep::Or, "d")],
                    },
                ],
            },
            WhereNode::Group {
                sep: Sep::Or,
                negate: false,
                children: vec![],
            },
        ];
        let mut out = SQL::empty();
        render_nodes(&nodes, RenderCx::default(), &mut out).unwrap();
        assert_eq!(out.sql(), "(a) AND ((b) OR NOT ((c) OR (d)))");
        assert_eq!(visible_len(&nodes), 2);
    }
}
