//! Every supervisor ever constructed, grouped by the concrete type that built it.
//!
//! Types form a tree rooted at [`Kind::base`]. Each node keeps the handles of
//! the instances of exactly that type, in construction order; walking the tree
//! from the root yields every instance of every type. Entries are never
//! removed, so a supervisor the caller dropped is still reachable by the
//! reaper at exit.

use std::{
    any::TypeId,
    collections::HashMap,
    fmt,
    sync::{LazyLock, Mutex, MutexGuard, PoisonError},
};

use crate::{supervisor::handle::SupervisorHandle, task::looping::LoopBase};

/// Identity of a supervisor type in the registry tree.
#[derive(Clone, Copy)]
pub struct Kind {
    id: TypeId,
    name: &'static str,
    parent: Option<fn() -> Kind>,
}

struct Base;

impl Kind {
    /// Root of the tree. Types without a declared parent hang directly under it.
    pub fn base() -> Self {
        Self {
            id: TypeId::of::<Base>(),
            name: "Subprocess",
            parent: None,
        }
    }

    /// Root of every loop-driven type; itself a child of [`Kind::base`].
    pub fn looping() -> Self {
        Self {
            id: TypeId::of::<LoopBase>(),
            name: "SubprocessLoop",
            parent: Some(Kind::base),
        }
    }

    /// Kind of `T`, placed under `parent`.
    pub fn new<T: ?Sized + 'static>(parent: fn() -> Kind) -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            parent: Some(parent),
        }
    }

    /// Kind of a [`Subprocess`](crate::Subprocess) type, as it registers itself.
    pub fn of<T: crate::Subprocess>() -> Self {
        T::kind()
    }

    /// Kind of a [`SubprocessLoop`](crate::SubprocessLoop) type.
    pub fn of_loop<L: crate::SubprocessLoop>() -> Self {
        <crate::Looping<L> as crate::Subprocess>::kind()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn parent(&self) -> Option<Kind> {
        self.parent.map(|parent| parent())
    }
}

impl PartialEq for Kind {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Kind {}

impl fmt::Debug for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Kind").field(&self.name).finish()
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

struct Node {
    kind: Kind,
    children: Vec<TypeId>,
    instances: Vec<SupervisorHandle>,
}

impl Node {
    fn new(kind: Kind) -> Self {
        Self {
            kind,
            children: Vec::new(),
            instances: Vec::new(),
        }
    }
}

pub(crate) struct Registry {
    /// Process the entries belong to. A forked child inherits a copy it must not act on.
    owner: u32,
    nodes: HashMap<TypeId, Node>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        let root = Kind::base();
        let mut nodes = HashMap::new();
        nodes.insert(root.id, Node::new(root));
        Self {
            owner: std::process::id(),
            nodes,
        }
    }

    fn adopt(&mut self) {
        if self.owner != std::process::id() {
            *self = Self::new();
        }
    }

    /// Inserts `kind` and any missing ancestors.
    fn ensure(&mut self, kind: Kind) {
        if self.nodes.contains_key(&kind.id) {
            return;
        }
        if let Some(parent) = kind.parent() {
            self.ensure(parent);
            if let Some(node) = self.nodes.get_mut(&parent.id) {
                node.children.push(kind.id);
            }
        }
        self.nodes.insert(kind.id, Node::new(kind));
    }

    pub(crate) fn register(&mut self, kind: Kind, handle: SupervisorHandle) {
        self.adopt();
        self.ensure(kind);
        if let Some(node) = self.nodes.get_mut(&kind.id) {
            node.instances.push(handle);
        }
    }

    /// Every instance, subtrees first, each kind's own instances after its children.
    pub(crate) fn depth_first(&mut self) -> Vec<SupervisorHandle> {
        self.adopt();
        let mut out = Vec::new();
        self.visit(Kind::base().id, &mut out);
        out
    }

    fn visit(&self, id: TypeId, out: &mut Vec<SupervisorHandle>) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        for child in &node.children {
            self.visit(*child, out);
        }
        out.extend(node.instances.iter().cloned());
    }

    pub(crate) fn instances_of(&mut self, kind: Kind) -> Vec<SupervisorHandle> {
        self.adopt();
        self.nodes
            .get(&kind.id)
            .map(|node| node.instances.clone())
            .unwrap_or_default()
    }

    pub(crate) fn kinds(&mut self) -> Vec<Kind> {
        self.adopt();
        self.nodes.values().map(|node| node.kind).collect()
    }
}

static REGISTRY: LazyLock<Mutex<Registry>> = LazyLock::new(|| Mutex::new(Registry::new()));

fn global() -> MutexGuard<'static, Registry> {
    REGISTRY.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn register(kind: Kind, handle: SupervisorHandle) {
    global().register(kind, handle);
    crate::reaper::install();
}

pub(crate) fn depth_first() -> Vec<SupervisorHandle> {
    global().depth_first()
}

/// Handles of every instance constructed with exactly this kind, oldest first.
pub fn instances_of(kind: Kind) -> Vec<SupervisorHandle> {
    global().instances_of(kind)
}

/// Every kind seen so far, including the two roots.
pub fn kinds() -> Vec<Kind> {
    global().kinds()
}
