//! Turns the flat reply rows of a post into a forest of nested [`ReplyNode`]s.
//!
//! Rows are linked only by `parent_id`. The builder indexes them by id and
//! then assembles children bottom up, so no node is ever shared or mutated
//! while borrowed and nesting depth is unbounded.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    entity::prelude::{ReplyModel, UserModel},
    ids::{PostId, ReplyId, UserId},
};

#[derive(Debug, Error)]
pub enum TreeError {
    #[error("reply {0} references an author that does not exist")]
    MissingAuthor(ReplyId),
}

/// What to do with a reply whose parent is not part of the fetched set.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrphanPolicy {
    /// Attach the orphan (and its descendants) at the root of the forest.
    #[default]
    Promote,
    /// Leave the orphan and its descendants out of the forest.
    Drop,
}

/// A reply joined with its author's display name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyView {
    pub id: ReplyId,
    pub post_id: PostId,
    pub parent_id: Option<ReplyId>,
    pub user_id: UserId,
    pub user_name: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReplyView {
    /// Combines a reply row with its joined author row.
    pub fn from_row(reply: ReplyModel, author: Option<UserModel>) -> Result<Self, TreeError> {
        let author = author.ok_or(TreeError::MissingAuthor(reply.id))?;

        Ok(Self {
            id: reply.id,
            post_id: reply.post_id,
            parent_id: reply.parent_id,
            user_id: reply.user_id,
            user_name: author.name,
            body: reply.body,
            created_at: reply.created_at,
            updated_at: reply.updated_at,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyNode {
    pub reply: ReplyView,
    pub children: Vec<ReplyNode>,
}

impl ReplyNode {
    pub fn leaf(reply: ReplyView) -> Self {
        Self {
            reply,
            children: Vec::new(),
        }
    }

    /// Number of replies in this subtree, this node included.
    pub fn size(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.children.iter());
        }
        count
    }

    /// Length of the longest root-to-leaf path, counted in nodes.
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(self, 1)];
        while let Some((node, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            stack.extend(node.children.iter().map(|child| (child, depth + 1)));
        }
        deepest
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReplyTreeBuilder {
    policy: OrphanPolicy,
}

impl ReplyTreeBuilder {
    pub fn new(policy: OrphanPolicy) -> Self {
        Self { policy }
    }

    /// Builds the forest straight from `find_also_related` rows.
    ///
    /// Fails if any row is missing its author, rather than rendering a
    /// placeholder name.
    pub fn build_from_rows(
        &self,
        rows: Vec<(ReplyModel, Option<UserModel>)>,
    ) -> Result<Vec<ReplyNode>, TreeError> {
        let replies = rows
            .into_iter()
            .map(|(reply, author)| ReplyView::from_row(reply, author))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(self.build(replies))
    }

    /// Builds the forest for replies that all belong to one post.
    ///
    /// Roots and siblings come out ordered by `(created_at, id)`.
    pub fn build(&self, mut replies: Vec<ReplyView>) -> Vec<ReplyNode> {
        replies.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        let len = replies.len();
        let index: HashMap<ReplyId, usize> = replies
            .iter()
            .enumerate()
            .map(|(position, reply)| (reply.id, position))
            .collect();

        let mut children: Vec<Vec<usize>> = vec![Vec::new(); len];
        let mut roots = Vec::new();
        let mut orphans = Vec::new();

        for (position, reply) in replies.iter().enumerate() {
            match reply.parent_id {
                None => roots.push(position),
                Some(parent_id) => match index.get(&parent_id) {
                    Some(&parent) => children[parent].push(position),
                    None => {
                        tracing::warn!(
                            reply_id = %reply.id,
                            %parent_id,
                            policy = ?self.policy,
                            "reply parent is not in this thread"
                        );
                        match self.policy {
                            OrphanPolicy::Promote => roots.push(position),
                            OrphanPolicy::Drop => orphans.push(position),
                        }
                    }
                },
            }
        }

        let mut walk = Walk {
            children: &children,
            visited: vec![false; len],
            tree_children: vec![Vec::new(); len],
            order: Vec::with_capacity(len),
        };

        for &root in &roots {
            walk.visit(root);
        }

        // Dropped subtrees are marked visited but never assembled.
        let kept = walk.order.len();
        for &orphan in &orphans {
            walk.visit(orphan);
        }
        walk.order.truncate(kept);

        // Whatever is still unvisited sits in or under a parent cycle. Promote
        // the earliest such reply and walk again until nothing is left.
        for position in 0..len {
            if !walk.visited[position] {
                tracing::warn!(
                    reply_id = %replies[position].id,
                    "reply parent chain forms a cycle, promoting to root"
                );
                roots.push(position);
                walk.visit(position);
            }
        }
        roots.sort_unstable();

        let Walk {
            tree_children,
            order,
            ..
        } = walk;

        let mut pending: Vec<Option<ReplyView>> = replies.into_iter().map(Some).collect();
        let mut built: Vec<Option<ReplyNode>> = (0..len).map(|_| None).collect();

        // Pre-order reversed: every child is assembled before its parent.
        for &position in order.iter().rev() {
            let node_children = tree_children[position]
                .iter()
                .filter_map(|&child| built[child].take())
                .collect();

            if let Some(reply) = pending[position].take() {
                built[position] = Some(ReplyNode {
                    reply,
                    children: node_children,
                });
            }
        }

        roots
            .into_iter()
            .filter_map(|root| built[root].take())
            .collect()
    }
}

struct Walk<'a> {
    children: &'a [Vec<usize>],
    visited: Vec<bool>,
    tree_children: Vec<Vec<usize>>,
    order: Vec<usize>,
}

impl Walk<'_> {
    /// Iterative pre-order walk from `start`, claiming every unvisited
    /// descendant as a tree edge.
    fn visit(&mut self, start: usize) {
        if self.visited[start] {
            return;
        }
        self.visited[start] = true;

        let children = self.children;
        let mut stack = vec![start];
        while let Some(position) = stack.pop() {
            self.order.push(position);

            for &child in &children[position] {
                if !self.visited[child] {
                    self.visited[child] = true;
                    self.tree_children[position].push(child);
                }
            }
            stack.extend(self.tree_children[position].iter().rev());
        }
    }
}
