use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerKind {
    Scope(String),
    /// The root of a nested scan with another grammar
    Sublanguage(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Container {
    pub kind: ContainerKind,
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Node {
    Text(String),
    Container(Container),
}

/// Receives the nodes of a tree in document order
pub trait TreeVisitor {
    fn text(&mut self, text: &str);
    fn open(&mut self, kind: &ContainerKind);
    fn close(&mut self, kind: &ContainerKind);
}

/// The output of a scan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TokenTree {
    pub children: Vec<Node>,
}

impl TokenTree {
    pub fn walk<V: TreeVisitor>(&self, visitor: &mut V) {
        fn walk_nodes<V: TreeVisitor>(nodes: &[Node], visitor: &mut V) {
            for node in nodes {
                match node {
                    Node::Text(t) => visitor.text(t),
                    Node::Container(c) => {
                        visitor.open(&c.kind);
                        walk_nodes(&c.children, visitor);
                        visitor.close(&c.kind);
                    }
                }
            }
        }
        walk_nodes(&self.children, visitor);
    }

    /// All the text leaves joined: always equal to the scanned input
    pub fn text(&self) -> String {
        struct Collect(String);
        impl TreeVisitor for Collect {
            fn text(&mut self, text: &str) {
                self.0.push_str(text);
            }
            fn open(&mut self, _: &ContainerKind) {}
            fn close(&mut self, _: &ContainerKind) {}
        }

        let mut collect = Collect(String::new());
        self.walk(&mut collect);
        collect.0
    }
}

/// Builds a tree from open/text/close events.
///
/// Adjacent text is merged and empty text is dropped.
#[derive(Debug, Default)]
pub(crate) struct TreeBuilder {
    root: Vec<Node>,
    open: Vec<Container>,
}

impl TreeBuilder {
    fn children(&mut self) -> &mut Vec<Node> {
        match self.open.last_mut() {
            Some(c) => &mut c.children,
            None => &mut self.root,
        }
    }

    pub fn add_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let children = self.children();
        if let Some(Node::Text(last)) = children.last_mut() {
            last.push_str(text);
        } else {
            children.push(Node::Text(text.to_owned()));
        }
    }

    pub fn add_keyword(&mut self, text: &str, scope: &str) {
        if text.is_empty() {
            return;
        }
        self.open_node(scope);
        self.add_text(text);
        self.close_node();
    }

    pub fn open_node(&mut self, scope: &str) {
        self.open.push(Container {
            kind: ContainerKind::Scope(scope.to_owned()),
            children: Vec::new(),
        });
    }

    pub fn close_node(&mut self) {
        if let Some(container) = self.open.pop() {
            self.children().push(Node::Container(container));
        }
    }

    pub fn close_all_nodes(&mut self) {
        while !self.open.is_empty() {
            self.close_node();
        }
    }

    pub fn add_sublanguage(&mut self, tree: TokenTree, language: &str) {
        self.children().push(Node::Container(Container {
            kind: ContainerKind::Sublanguage(language.to_owned()),
            children: tree.children,
        }));
    }

    pub fn finish(mut self) -> TokenTree {
        self.close_all_nodes();
        TokenTree {
            children: self.root,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope(name: &str, children: Vec<Node>) -> Node {
        Node::Container(Container {
            kind: ContainerKind::Scope(name.to_owned()),
            children,
        })
    }

    fn text(t: &str) -> Node {
        Node::Text(t.to_owned())
    }

    #[test]
    fn merges_text_and_nests() {
        let mut b = TreeBuilder::default();
        b.add_text("a");
        b.add_text("");
        b.add_text("b");
        b.open_node("string");
        b.add_text("'x'");
        b.add_keyword("", "ignored");
        b.add_keyword("if", "keyword");
        b.close_node();
        b.add_text("c");
        let tree = b.finish();

        assert_eq!(
            tree.children,
            vec![
                text("ab"),
                scope("string", vec![text("'x'"), scope("keyword", vec![text("if")])]),
                text("c"),
            ]
        );
        assert_eq!(tree.text(), "ab'x'ifc");
    }

    #[test]
    fn finish_closes_everything() {
        let mut b = TreeBuilder::default();
        b.open_node("a");
        b.open_node("b");
        b.add_text("x");
        let tree = b.finish();
        assert_eq!(tree.children, vec![scope("a", vec![scope("b", vec![text("x")])])]);
    }

    #[test]
    fn close_without_open_is_ignored() {
        let mut b = TreeBuilder::default();
        b.close_node();
        b.add_text("x");
        assert_eq!(b.finish().children, vec![text("x")]);
    }

    #[test]
    fn serializes_to_json() {
        let mut b = TreeBuilder::default();
        b.add_keyword("fn", "keyword");
        let mut inner = TreeBuilder::default();
        inner.add_text("1");
        b.add_sublanguage(inner.finish(), "json");
        let json = serde_json::to_string(&b.finish()).unwrap();
        insta::assert_snapshot!(json, @r#"{"children":[{"kind":{"scope":"keyword"},"children":["fn"]},{"kind":{"sublanguage":"json"},"children":["1"]}]}"#);
    }
}
