//! Per-method radix tree.
//!
//! Every node holds a byte fragment of one or more registered patterns.
//! Shared prefixes are stored once; a lookup walks the tree consuming the
//! request path fragment by fragment and never backtracks.
//!
//! ```text
//! insert /api/users, /api/usage, /api/users/:id, /files/*rest
//!
//! /
//! ├── api/us
//! │   ├── ers              ← /api/users
//! │   │   └── /            (wild child)
//! │   │       └── :id      ← /api/users/:id
//! │   └── age              ← /api/usage
//! └── files/               (wild child)
//!     └── *rest            ← /files/*rest
//! ```
//!
//! # Pattern grammar
//!
//! - literal bytes match themselves;
//! - `:name` matches one non-empty segment (up to the next `/`);
//! - `*name` matches everything that remains, `/` included. It must be the
//!   final segment and must directly follow a `/`.
//!
//! A node has either static children or exactly one wildcard child, never
//! both, which is what makes the walk deterministic.

use std::mem;
use std::sync::Arc;

use crate::error::RouteError;
use crate::handler::Chain;
use crate::params::Params;

/// What a node matches.
#[derive(Clone, Debug, PartialEq, Eq)]
enum NodeKind {
    Static,
    Param { name: Box<str> },
    CatchAll { name: Box<str> },
}

struct Node {
    /// Literal fragment, or the whole wildcard segment (`:id`, `*rest`).
    path: Vec<u8>,
    kind: NodeKind,
    /// First byte of each static child, parallel to `children`.
    indices: Vec<u8>,
    children: Vec<Node>,
    /// Set when the only child is a `Param` or `CatchAll` node.
    wild_child: bool,
    /// Number of routes registered through this subtree.
    priority: u32,
    chain: Option<Chain>,
    /// The registered pattern, for diagnostics and `Context::full_path`.
    full_path: Arc<str>,
}

/// A successful lookup.
pub struct Match<'t> {
    pub chain: &'t Chain,
    pub params: Params,
    pub pattern: &'t str,
}

/// A radix tree of routes for one HTTP method.
pub struct RouteTree {
    root: Node,
}

impl RouteTree {
    pub fn new() -> Self {
        Self { root: Node::new(Arc::from("")) }
    }

    /// Binds `chain` to `pattern`.
    ///
    /// The pattern is checked for syntax errors before the tree is touched.
    /// Structural conflicts are detected during the walk; an error there
    /// leaves the tree matching exactly what it matched before, though
    /// edges may have been split and priorities bumped along the way.
    pub fn insert(&mut self, pattern: &str, chain: Chain) -> Result<(), RouteError> {
        validate(pattern)?;
        let full: Arc<str> = Arc::from(pattern);
        let root = &mut self.root;
        root.priority += 1;

        if root.path.is_empty() && root.children.is_empty() && root.chain.is_none() {
            return root.insert_child(pattern.as_bytes(), &full, chain);
        }
        root.walk(pattern.as_bytes(), &full, chain)
    }

    /// Resolves `path` to its chain, parameters and matched pattern.
    pub fn lookup(&self, path: &str) -> Option<Match<'_>> {
        let mut params = Params::new();
        let (chain, pattern) = self.find(path, &mut params)?;
        Some(Match { chain, params, pattern })
    }

    /// Like [`lookup`](Self::lookup) but fills a caller-owned parameter
    /// buffer, which is left empty on a miss.
    pub(crate) fn find<'t>(
        &'t self,
        path: &str,
        params: &mut Params,
    ) -> Option<(&'t Chain, &'t Arc<str>)> {
        params.clear();
        let found = self.root.find(path, params);
        if found.is_none() {
            params.clear();
        }
        found
    }

    /// Every registered pattern, in tree order.
    pub fn patterns(&self) -> Vec<Arc<str>> {
        let mut out = Vec::new();
        self.root.collect(&mut out);
        out
    }
}

impl Default for RouteTree {
    fn default() -> Self { Self::new() }
}

impl Node {
    fn new(full_path: Arc<str>) -> Self {
        Self {
            path: Vec::new(),
            kind: NodeKind::Static,
            indices: Vec::new(),
            children: Vec::new(),
            wild_child: false,
            priority: 0,
            chain: None,
            full_path,
        }
    }

    fn wildcard(segment: &[u8], kind: NodeKind, full_path: &Arc<str>) -> Self {
        Self {
            path: segment.to_vec(),
            kind,
            priority: 1,
            ..Self::new(Arc::clone(full_path))
        }
    }

    // ── Insertion ─────────────────────────────────────────────────────────────

    fn walk(&mut self, path: &[u8], full: &Arc<str>, chain: Chain) -> Result<(), RouteError> {
        let i = longest_common_prefix(path, &self.path);

        if i < self.path.len() {
            self.split(i);
        }

        if i == path.len() {
            return self.bind(full, chain);
        }

        let rest = &path[i..];

        if self.wild_child {
            let child = &mut self.children[0];
            child.priority += 1;
            let len = child.path.len();
            if rest.starts_with(&child.path) && (rest.len() == len || rest[len] == b'/') {
                return child.walk(rest, full, chain);
            }
            return Err(RouteError::WildcardConflict {
                path: full.to_string(),
                segment: lossy(segment(rest)),
                existing: lossy(&child.path),
            });
        }

        let first = rest[0];
        if let Some(pos) = self.indices.iter().position(|&c| c == first) {
            let pos = self.increment_child_priority(pos);
            return self.children[pos].walk(rest, full, chain);
        }

        if first != b':' && first != b'*' {
            self.indices.push(first);
            self.children.push(Node::new(Arc::clone(full)));
            let pos = self.increment_child_priority(self.children.len() - 1);
            return self.children[pos].insert_child(rest, full, chain);
        }

        self.insert_child(rest, full, chain)
    }

    /// Moves everything after byte `i` into a new single child.
    fn split(&mut self, i: usize) {
        let child = Node {
            path: self.path[i..].to_vec(),
            kind: NodeKind::Static,
            indices: mem::take(&mut self.indices),
            children: mem::take(&mut self.children),
            wild_child: self.wild_child,
            priority: self.priority.saturating_sub(1),
            chain: self.chain.take(),
            full_path: Arc::clone(&self.full_path),
        };

        self.indices = vec![child.path[0]];
        self.children = vec![child];
        self.path.truncate(i);
        self.wild_child = false;
    }

    fn bind(&mut self, full: &Arc<str>, chain: Chain) -> Result<(), RouteError> {
        if self.chain.is_some() {
            return Err(RouteError::Duplicate { path: full.to_string() });
        }
        // `/files/` and `/files/*rest` would both claim `/files/`.
        if self.wild_child && matches!(self.children[0].kind, NodeKind::CatchAll { .. }) {
            return Err(RouteError::CatchAllConflict { path: full.to_string() });
        }
        self.chain = Some(chain);
        self.full_path = Arc::clone(full);
        Ok(())
    }

    /// Stores the unconsumed `path` below `self`, creating wildcard nodes
    /// as needed. `self` is either a fresh node or one whose fragment has
    /// been fully consumed and `path` starts with a wildcard.
    fn insert_child(&mut self, path: &[u8], full: &Arc<str>, chain: Chain) -> Result<(), RouteError> {
        let Some((start, len)) = find_wildcard(path).map(|w| (w.start, w.len)) else {
            self.path = path.to_vec();
            self.chain = Some(chain);
            self.full_path = Arc::clone(full);
            return Ok(());
        };

        let wildcard = &path[start..start + len];

        if !self.children.is_empty() {
            return Err(RouteError::ConflictsWithChildren {
                path: full.to_string(),
                segment: lossy(wildcard),
            });
        }

        if start > 0 {
            self.path = path[..start].to_vec();
        }

        let name: Box<str> = lossy(&wildcard[1..]).into();
        let rest = &path[start + len..];

        if wildcard[0] == b':' {
            let mut child = Node::wildcard(wildcard, NodeKind::Param { name }, full);
            if rest.is_empty() {
                child.chain = Some(chain);
            } else {
                let mut next = Node::new(Arc::clone(full));
                next.priority = 1;
                next.insert_child(rest, full, chain)?;
                child.indices = vec![b'/'];
                child.children = vec![next];
            }
            self.wild_child = true;
            self.children = vec![child];
            return Ok(());
        }

        if self.chain.is_some() {
            return Err(RouteError::CatchAllConflict { path: full.to_string() });
        }

        let mut child = Node::wildcard(wildcard, NodeKind::CatchAll { name }, full);
        child.chain = Some(chain);
        self.wild_child = true;
        self.children = vec![child];
        Ok(())
    }

    /// Bumps the child at `pos` and bubbles it ahead of lower-priority
    /// siblings. Returns its new position.
    fn increment_child_priority(&mut self, pos: usize) -> usize {
        self.children[pos].priority += 1;
        let priority = self.children[pos].priority;

        let mut new_pos = pos;
        while new_pos > 0 && self.children[new_pos - 1].priority < priority {
            self.children.swap(new_pos - 1, new_pos);
            self.indices.swap(new_pos - 1, new_pos);
            new_pos -= 1;
        }
        new_pos
    }

    // ── Lookup ────────────────────────────────────────────────────────────────

    fn find<'t>(&'t self, path: &str, params: &mut Params) -> Option<(&'t Chain, &'t Arc<str>)> {
        let bytes = path.as_bytes();
        let mut node = self;
        let mut offset = 0;

        loop {
            let rest = &bytes[offset..];
            if !rest.starts_with(&node.path) {
                return None;
            }

            if rest.len() == node.path.len() {
                if let Some(chain) = &node.chain {
                    return Some((chain, &node.full_path));
                }
                // A catch-all also matches an empty remainder.
                if node.wild_child {
                    let child = &node.children[0];
                    if let NodeKind::CatchAll { name } = &child.kind {
                        params.insert(name, "");
                        return child.chain.as_ref().map(|c| (c, &child.full_path));
                    }
                }
                return None;
            }

            offset += node.path.len();

            let next = bytes[offset];
            if let Some(pos) = node.indices.iter().position(|&c| c == next) {
                node = &node.children[pos];
                continue;
            }

            if !node.wild_child {
                return None;
            }

            let child = &node.children[0];
            match &child.kind {
                NodeKind::Param { name } => {
                    let end = bytes[offset..]
                        .iter()
                        .position(|&c| c == b'/')
                        .map_or(bytes.len(), |p| offset + p);
                    if end == offset {
                        return None;
                    }
                    params.insert(name, path.get(offset..end)?);

                    if end < bytes.len() {
                        node = child.children.first()?;
                        offset = end;
                        continue;
                    }
                    return child.chain.as_ref().map(|c| (c, &child.full_path));
                }
                NodeKind::CatchAll { name } => {
                    params.insert(name, path.get(offset..)?);
                    return child.chain.as_ref().map(|c| (c, &child.full_path));
                }
                NodeKind::Static => return None,
            }
        }
    }

    fn collect(&self, out: &mut Vec<Arc<str>>) {
        if self.chain.is_some() {
            out.push(Arc::clone(&self.full_path));
        }
        for child in &self.children {
            child.collect(out);
        }
    }
}

// ── Pattern helpers ───────────────────────────────────────────────────────────

struct Wildcard {
    start: usize,
    len: usize,
    /// `false` when a second sigil appears inside the same segment.
    valid: bool,
}

/// Locates the first `:name` or `*name` in `path`.
fn find_wildcard(path: &[u8]) -> Option<Wildcard> {
    let start = path.iter().position(|&c| c == b':' || c == b'*')?;
    let mut valid = true;
    for (offset, &c) in path[start + 1..].iter().enumerate() {
        match c {
            b'/' => return Some(Wildcard { start, len: offset + 1, valid }),
            b':' | b'*' => valid = false,
            _ => {}
        }
    }
    Some(Wildcard { start, len: path.len() - start, valid })
}

fn validate(pattern: &str) -> Result<(), RouteError> {
    let bytes = pattern.as_bytes();
    let err_path = || pattern.to_owned();

    if bytes.first() != Some(&b'/') {
        return Err(RouteError::MissingLeadingSlash { path: err_path() });
    }

    let mut offset = 0;
    while let Some(w) = find_wildcard(&bytes[offset..]) {
        let start = offset + w.start;
        if !w.valid {
            return Err(RouteError::MultipleWildcards { path: err_path() });
        }
        if w.len < 2 {
            return Err(RouteError::UnnamedWildcard { path: err_path() });
        }
        if bytes[start] == b'*' {
            if start + w.len != bytes.len() {
                return Err(RouteError::CatchAllNotLast { path: err_path() });
            }
            if bytes[start - 1] != b'/' {
                return Err(RouteError::CatchAllWithoutSlash { path: err_path() });
            }
        }
        offset = start + w.len;
    }
    Ok(())
}

fn longest_common_prefix(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

/// `path` up to (not including) its first `/`.
fn segment(path: &[u8]) -> &[u8] {
    let end = path.iter().position(|&c| c == b'/').unwrap_or(path.len());
    &path[..end]
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}
