//! Subscription topic tree (§4.1). A prefix tree over `/`-separated topic
//! segments, mutated transactionally so a SUBSCRIBE/UNSUBSCRIBE that fails
//! to reach the transport leaves the tree exactly as it was.

use std::collections::HashMap;

use mqttbytes::QoS;

pub type OnPublish = Box<dyn FnMut(&str, &[u8], bool, QoS, bool) + Send>;
pub type OnCleanup = Box<dyn FnOnce() + Send>;

/// The payload held at a terminal node — what `insert` creates and `remove`
/// tears down.
pub struct Terminal {
    pub qos: QoS,
    pub on_publish: OnPublish,
    pub on_cleanup: Option<OnCleanup>,
    pub local_only: bool,
    refcount: usize,
}

#[derive(Default)]
struct Node {
    children: HashMap<String, Node>,
    terminal: Option<Terminal>,
}

impl Node {
    fn is_empty(&self) -> bool {
        self.children.is_empty() && self.terminal.is_none()
    }
}

/// A staged insert or remove, with enough state to undo it. Pushed in
/// application order; `roll_back` walks it in reverse (§9 DESIGN NOTES).
enum Action {
    /// Path didn't exist before; rollback removes every node the insert
    /// created, from the leaf back up to (but not including) the first
    /// node that pre-existed.
    Inserted { path: Vec<String> },
    /// Path already existed with a terminal; rollback restores it. The
    /// terminal is taken out of the tree while staged so only one
    /// transaction can hold it at a time.
    Replaced { path: Vec<String>, prior: Terminal },
    /// Path existed and its terminal was removed entirely; rollback
    /// reinserts it.
    Removed { path: Vec<String>, prior: Terminal },
}

#[derive(Default)]
pub struct Transaction {
    log: Vec<Action>,
}

/// Prefix tree over subscription filters, single-writer (I/O thread only
/// per §5).
#[derive(Default)]
pub struct TopicTree {
    root: Node,
}

fn segments(filter: &str) -> Vec<String> {
    filter.split('/').map(str::to_owned).collect()
}

impl TopicTree {
    pub fn new() -> TopicTree {
        TopicTree::default()
    }

    /// Idempotent: inserting an already-present filter bumps its refcount
    /// instead of erroring.
    pub fn insert(
        &mut self,
        filter: &str,
        qos: QoS,
        on_publish: OnPublish,
        on_cleanup: Option<OnCleanup>,
        local_only: bool,
    ) {
        let path = segments(filter);
        let mut node = &mut self.root;
        for seg in &path {
            node = node.children.entry(seg.clone()).or_insert_with(Node::default);
        }

        match &mut node.terminal {
            Some(terminal) => terminal.refcount += 1,
            None => {
                node.terminal = Some(Terminal {
                    qos,
                    on_publish,
                    on_cleanup,
                    local_only,
                    refcount: 1,
                });
            }
        }
    }

    /// Decrements the refcount; on last release removes the node (pruning
    /// empty ancestors) and fires `on_cleanup`.
    pub fn remove(&mut self, filter: &str) -> Option<bool> {
        let path = segments(filter);
        let local_only = {
            let node = Self::find_mut(&mut self.root, &path)?;
            let terminal = node.terminal.as_mut()?;
            terminal.refcount -= 1;
            if terminal.refcount > 0 {
                return Some(terminal.local_only);
            }
            terminal.local_only
        };

        let mut terminal = {
            let node = Self::find_mut(&mut self.root, &path)?;
            node.terminal.take()
        };
        if let Some(cleanup) = terminal.as_mut().and_then(|t| t.on_cleanup.take()) {
            cleanup();
        }
        Self::prune(&mut self.root, &path, 0);

        Some(local_only)
    }

    fn find_mut<'a>(root: &'a mut Node, path: &[String]) -> Option<&'a mut Node> {
        let mut node = root;
        for seg in path {
            node = node.children.get_mut(seg)?;
        }
        Some(node)
    }

    fn prune(node: &mut Node, path: &[String], depth: usize) -> bool {
        if depth == path.len() {
            return node.is_empty();
        }

        let seg = &path[depth];
        let should_remove = match node.children.get_mut(seg) {
            Some(child) => Self::prune(child, path, depth + 1),
            None => false,
        };

        if should_remove {
            node.children.remove(seg);
        }

        node.is_empty()
    }

    pub fn transaction_insert(
        &mut self,
        tx: &mut Transaction,
        filter: &str,
        qos: QoS,
        on_publish: OnPublish,
        on_cleanup: Option<OnCleanup>,
        local_only: bool,
    ) {
        let path = segments(filter);
        let existed = Self::find_mut(&mut self.root, &path).is_some();

        if !existed {
            // create the path now, remember it so rollback can tear it down
            let mut node = &mut self.root;
            for seg in &path {
                node = node.children.entry(seg.clone()).or_insert_with(Node::default);
            }
            node.terminal = Some(Terminal { qos, on_publish, on_cleanup, local_only, refcount: 1 });
            tx.log.push(Action::Inserted { path });
            return;
        }

        let node = Self::find_mut(&mut self.root, &path).expect("checked above");
        match node.terminal.take() {
            Some(mut prior) => {
                prior.refcount += 1;
                let replacement = Terminal {
                    qos,
                    on_publish,
                    on_cleanup,
                    local_only,
                    refcount: prior.refcount,
                };
                node.terminal = Some(replacement);
                tx.log.push(Action::Replaced { path, prior });
            }
            None => {
                node.terminal = Some(Terminal { qos, on_publish, on_cleanup, local_only, refcount: 1 });
                tx.log.push(Action::Inserted { path });
            }
        }
    }

    /// Stages the removal, returning the filter's `local_only` flag if it
    /// existed. Refcounted subscriptions are fully removed here too —
    /// unlike the non-transactional `remove`, a transactional UNSUBSCRIBE
    /// always drops the filter outright on commit.
    pub fn transaction_remove(&mut self, tx: &mut Transaction, filter: &str) -> Option<bool> {
        let path = segments(filter);
        let node = Self::find_mut(&mut self.root, &path)?;
        let terminal = node.terminal.take()?;
        let local_only = terminal.local_only;

        tx.log.push(Action::Removed { path, prior: terminal });
        Some(local_only)
    }

    /// The mutations already happened in the tree; committing only needs
    /// to finish what a plain `remove()` does for a removal — fire
    /// `on_cleanup` and prune the now-empty node — since `transaction_remove`
    /// stages the removal without doing either.
    pub fn transaction_commit(&mut self, tx: Transaction) {
        for action in tx.log {
            if let Action::Removed { path, mut prior } = action {
                if let Some(cleanup) = prior.on_cleanup.take() {
                    cleanup();
                }
                Self::prune(&mut self.root, &path, 0);
            }
        }
    }

    /// Walks the log in reverse, undoing every staged action.
    pub fn transaction_roll_back(&mut self, tx: Transaction) {
        for action in tx.log.into_iter().rev() {
            match action {
                Action::Inserted { path } => {
                    let node = Self::find_mut(&mut self.root, &path);
                    if let Some(node) = node {
                        node.terminal = None;
                    }
                    Self::prune(&mut self.root, &path, 0);
                }
                Action::Replaced { path, prior } | Action::Removed { path, prior } => {
                    if let Some(node) = Self::find_mut(&mut self.root, &path) {
                        node.terminal = Some(prior);
                    }
                }
            }
        }
    }

    /// Visits every non-`local_only` terminal — local subscriptions are
    /// never sent upstream (§4.5), so callers that rebuild a wire SUBSCRIBE
    /// from this (e.g. `resubscribe_existing`) never see them.
    pub fn iterate<F: FnMut(&str, QoS)>(&self, mut visitor: F) {
        fn walk<F: FnMut(&str, QoS)>(node: &Node, prefix: &mut Vec<String>, visitor: &mut F) {
            if let Some(terminal) = &node.terminal {
                if !terminal.local_only {
                    visitor(&prefix.join("/"), terminal.qos);
                }
            }
            for (seg, child) in &node.children {
                prefix.push(seg.clone());
                walk(child, prefix, visitor);
                prefix.pop();
            }
        }

        let mut prefix = Vec::new();
        walk(&self.root, &mut prefix, &mut visitor);
    }

    /// Dispatches an inbound PUBLISH to every matching subscription. `+`
    /// matches exactly one segment, `#` matches the remainder (terminal
    /// only). A topic matched by several filters invokes each once.
    pub fn publish(&mut self, topic: &str, payload: &[u8], dup: bool, qos: QoS, retain: bool) {
        let topic_segments: Vec<&str> = topic.split('/').collect();
        Self::dispatch(&mut self.root, &topic_segments, topic, payload, dup, qos, retain);
    }

    fn dispatch(
        node: &mut Node,
        remaining: &[&str],
        topic: &str,
        payload: &[u8],
        dup: bool,
        qos: QoS,
        retain: bool,
    ) {
        // '#' matches the remainder, including zero segments, so it must be
        // checked before remaining is tested for emptiness.
        if let Some(hash_child) = node.children.get_mut("#") {
            if let Some(terminal) = &mut hash_child.terminal {
                (terminal.on_publish)(topic, payload, dup, qos, retain);
            }
        }

        if remaining.is_empty() {
            if let Some(terminal) = &mut node.terminal {
                (terminal.on_publish)(topic, payload, dup, qos, retain);
            }
            return;
        }

        let seg = remaining[0];
        let rest = &remaining[1..];

        if let Some(exact) = node.children.get_mut(seg) {
            Self::dispatch(exact, rest, topic, payload, dup, qos, retain);
        }

        if seg != "#" {
            if let Some(plus) = node.children.get_mut("+") {
                Self::dispatch(plus, rest, topic, payload, dup, qos, retain);
            }
        }
    }
}
