//! Flattening of the nested reply structure returned with a post into rows
//! ready for indented display.

use serde_json::Value;

/// Columns of indentation added per reply level.
pub const INDENT_WIDTH: usize = 2;

#[derive(Debug, Clone, PartialEq)]
pub struct CommentRow {
    pub name: String,
    pub author: String,
    pub body: String,
    pub score: i64,
    pub likes: Option<bool>,
    pub created_utc: f64,
    pub depth: usize,
    pub descendants: usize,
}

impl CommentRow {
    pub fn indent(&self) -> usize {
        indent(self.depth)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommentTree {
    pub rows: Vec<CommentRow>,
    /// Replies the API left behind "load more" stubs instead of sending.
    pub more: usize,
    /// Nodes dropped because they were deleted or not comments.
    pub skipped: usize,
}

impl CommentTree {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

pub fn indent(depth: usize) -> usize {
    depth * INDENT_WIDTH
}

/// Walks `children` depth first. Non-`t1` nodes are skipped, as is any node
/// without an author together with its whole subtree.
pub fn flatten(children: &[Value]) -> CommentTree {
    let mut tree = CommentTree::default();
    walk(children, 0, &mut tree);
    tree
}

fn walk(children: &[Value], depth: usize, tree: &mut CommentTree) -> usize {
    let mut rendered = 0;
    for node in children {
        match node.get("kind").and_then(Value::as_str) {
            Some("t1") => {}
            Some("more") => {
                tree.more += more_count(node);
                continue;
            }
            _ => {
                tree.skipped += 1;
                continue;
            }
        }

        let Some(data) = node.get("data").filter(|d| d.is_object()) else {
            tree.skipped += 1;
            continue;
        };
        let Some(author) = data.get("author").and_then(Value::as_str) else {
            tree.skipped += 1;
            continue;
        };

        let index = tree.rows.len();
        tree.rows.push(CommentRow {
            name: str_field(data, "name"),
            author: author.to_string(),
            body: str_field(data, "body"),
            score: data.get("score").and_then(Value::as_i64).unwrap_or(0),
            likes: data.get("likes").and_then(Value::as_bool),
            created_utc: data.get("created_utc").and_then(Value::as_f64).unwrap_or(0.0),
            depth,
            descendants: 0,
        });

        let nested = reply_children(data)
            .map(|replies| walk(replies, depth + 1, tree))
            .unwrap_or(0);
        tree.rows[index].descendants = nested;
        rendered += 1 + nested;
    }
    rendered
}

/// `replies` is an empty string when a comment has none; only a listing with
/// a `children` array is descended into.
fn reply_children(data: &Value) -> Option<&[Value]> {
    data.get("replies")?
        .get("data")?
        .get("children")?
        .as_array()
        .map(Vec::as_slice)
        .filter(|children| !children.is_empty())
}

fn more_count(node: &Value) -> usize {
    let data = node.get("data");
    data.and_then(|d| d.get("count"))
        .and_then(Value::as_u64)
        .map(|count| count as usize)
        .filter(|count| *count > 0)
        .or_else(|| {
            data.and_then(|d| d.get("children"))
                .and_then(Value::as_array)
                .map(Vec::len)
        })
        .unwrap_or(0)
}

fn str_field(data: &Value, key: &str) -> String {
    data.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn comment(author: &str, body: &str, replies: Value) -> Value {
        json!({
            "kind": "t1",
            "data": {
                "name": format!("t1_{body}"),
                "author": author,
                "body": body,
                "score": 3,
                "replies": replies,
            }
        })
    }

    fn listing(children: Vec<Value>) -> Value {
        json!({ "kind": "Listing", "data": { "children": children } })
    }

    #[test]
    fn depth_increases_per_reply_level() {
        let tree = flatten(&[comment(
            "a",
            "root",
            listing(vec![comment(
                "b",
                "child",
                listing(vec![comment("c", "grandchild", json!(""))]),
            )]),
        )]);
        let depths: Vec<_> = tree.rows.iter().map(|r| (r.body.as_str(), r.depth)).collect();
        assert_eq!(depths, vec![("root", 0), ("child", 1), ("grandchild", 2)]);
        assert_eq!(tree.rows[2].indent(), 2 * INDENT_WIDTH);
        assert_eq!(tree.rows[0].descendants, 2);
        assert_eq!(tree.rows[1].descendants, 1);
    }

    #[test]
    fn siblings_keep_document_order() {
        let tree = flatten(&[
            comment("a", "one", listing(vec![comment("b", "one-reply", json!(""))])),
            comment("c", "two", json!(null)),
        ]);
        let bodies: Vec<_> = tree.rows.iter().map(|r| r.body.as_str()).collect();
        assert_eq!(bodies, vec!["one", "one-reply", "two"]);
        assert_eq!(tree.rows[2].depth, 0);
    }

    #[test]
    fn deleted_comments_drop_their_subtree() {
        let deleted = json!({
            "kind": "t1",
            "data": {
                "author": null,
                "body": "[removed]",
                "replies": listing(vec![comment("b", "orphan", json!(""))]),
            }
        });
        let tree = flatten(&[deleted, comment("a", "kept", json!(""))]);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.rows[0].body, "kept");
        assert_eq!(tree.skipped, 1);
    }

    #[test]
    fn missing_author_is_treated_as_deleted() {
        let node = json!({ "kind": "t1", "data": { "body": "no author" } });
        let tree = flatten(&[node]);
        assert!(tree.is_empty());
    }

    #[test]
    fn non_comment_nodes_are_skipped() {
        let tree = flatten(&[
            json!({ "kind": "t3", "data": { "author": "x" } }),
            json!({ "data": { "author": "x" } }),
            json!("garbage"),
            json!({ "kind": "t1", "data": "not an object" }),
            comment("a", "real", json!("")),
        ]);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.skipped, 4);
    }

    #[test]
    fn more_stubs_are_counted_not_rendered() {
        let tree = flatten(&[
            comment("a", "real", json!("")),
            json!({ "kind": "more", "data": { "count": 7, "children": ["x", "y"] } }),
            json!({ "kind": "more", "data": { "count": 0, "children": ["z"] } }),
        ]);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.more, 8);
    }

    #[test]
    fn empty_reply_shapes_terminate() {
        let shapes = [
            json!(""),
            json!(null),
            json!({}),
            json!({ "data": {} }),
            listing(vec![]),
        ];
        for replies in shapes {
            let tree = flatten(&[comment("a", "leaf", replies.clone())]);
            assert_eq!(tree.len(), 1, "replies shape {replies}");
            assert_eq!(tree.rows[0].descendants, 0);
        }
        assert!(flatten(&[]).is_empty());
    }
}
