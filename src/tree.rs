//! The group/test ownership tree.
//!
//! Groups live in an arena owned by [`TestTree`]; callers hold copyable
//! [`GroupId`] handles into it. Each group keeps its child groups and tests
//! in registration order, which is also the traversal order of the runner.
//! Parent links are plain non-owning ids.
//!
//! Every group node and test registration is charged against the tree's
//! [`TreeAlloc`] capability, installed on the root and inherited by every
//! descendant. [`TestTree::release`] tears a subtree down post-order,
//! unlinking it from the remaining tree before crediting its memory back;
//! dropping the tree settles whatever is still live.

use std::{borrow::Cow, sync::Arc};

use log::trace;

use crate::{
    alloc::{AllocError, SystemAlloc, TreeAlloc},
    check::RunContext,
    test::{Test, TestFnHandle, TestResult},
};

const GROUP_CHARGE: usize = size_of::<GroupNode>();
const TEST_CHARGE: usize = size_of::<Test>();

/// Handle to a group in a [`TestTree`].
///
/// Handles stay valid until their group is released. Using a handle after
/// that is a caller bug and panics, like indexing out of range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupId {
    index: u32,
    generation: u32,
}

pub(crate) type Fixture = Box<dyn Fn()>;

pub(crate) struct GroupNode {
    pub(crate) name: Cow<'static, str>,
    pub(crate) parent: Option<GroupId>,
    pub(crate) children: Vec<GroupId>,
    pub(crate) tests: Vec<Test>,
    pub(crate) setup: Option<Fixture>,
    pub(crate) teardown: Option<Fixture>,
}

struct Slot {
    generation: u32,
    node: Option<GroupNode>,
}

/// The test hierarchy: a root group, its descendants, and the allocator
/// capability they account through.
pub struct TestTree {
    slots: Vec<Slot>,
    free: Vec<u32>,
    alloc: Arc<dyn TreeAlloc>,
    root: GroupId,
}

impl TestTree {
    /// Build a tree on the no-op [`SystemAlloc`] policy.
    pub fn new() -> Self {
        match Self::with_alloc(Arc::new(SystemAlloc)) {
            Ok(tree) => tree,
            // SystemAlloc never refuses a charge
            Err(err) => unreachable!("{err}"),
        }
    }

    /// Build a tree that accounts through the given capability. The root
    /// group has an empty name and contributes no path segment.
    pub fn with_alloc(alloc: Arc<dyn TreeAlloc>) -> Result<Self, AllocError> {
        alloc.allocate(GROUP_CHARGE)?;
        let root_node = GroupNode {
            name: Cow::Borrowed(""),
            parent: None,
            children: Vec::new(),
            tests: Vec::new(),
            setup: None,
            teardown: None,
        };
        let root = GroupId {
            index: 0,
            generation: 0,
        };
        Ok(Self {
            slots: vec![Slot {
                generation: 0,
                node: Some(root_node),
            }],
            free: Vec::new(),
            alloc,
            root,
        })
    }

    pub fn root(&self) -> GroupId {
        self.root
    }

    /// Create a child group, appended to the end of `parent`'s child list.
    pub fn create_group(
        &mut self,
        parent: GroupId,
        name: impl Into<Cow<'static, str>>,
    ) -> Result<GroupId, AllocError> {
        self.node(parent);
        self.alloc.allocate(GROUP_CHARGE)?;
        let id = self.insert(GroupNode {
            name: name.into(),
            parent: Some(parent),
            children: Vec::new(),
            tests: Vec::new(),
            setup: None,
            teardown: None,
        });
        self.node_mut(parent).children.push(id);
        Ok(id)
    }

    /// Register a test at the end of `group`'s test list.
    pub fn add_test<F, T>(
        &mut self,
        group: GroupId,
        name: impl Into<Cow<'static, str>>,
        f: F,
    ) -> Result<(), AllocError>
    where
        F: Fn(&mut RunContext) -> T + 'static,
        T: Into<TestResult>,
    {
        self.add_test_handle(group, Test::new(name, TestFnHandle::from_boxed(f)))
    }

    /// Register an already built [`Test`], for callers that avoid boxing by
    /// using the [`Ptr`](TestFnHandle::Ptr) or
    /// [`Static`](TestFnHandle::Static) handle variants.
    pub fn add_test_handle(&mut self, group: GroupId, test: Test) -> Result<(), AllocError> {
        self.node(group);
        self.alloc.allocate(TEST_CHARGE)?;
        self.node_mut(group).tests.push(test);
        Ok(())
    }

    /// Attach the setup fixture, replacing any previous one.
    pub fn set_setup(&mut self, group: GroupId, f: impl Fn() + 'static) {
        self.node_mut(group).setup = Some(Box::new(f));
    }

    /// Attach the teardown fixture, replacing any previous one.
    pub fn set_teardown(&mut self, group: GroupId, f: impl Fn() + 'static) {
        self.node_mut(group).teardown = Some(Box::new(f));
    }

    /// Release `group` and its whole subtree: children post-order first,
    /// then the group's own tests, then the group itself, unlinked from its
    /// parent before any memory is credited back.
    ///
    /// Releasing a non-root group leaves siblings and ancestors intact.
    /// Releasing the root spends the tree; normally the root is settled by
    /// dropping the [`TestTree`] instead.
    pub fn release(&mut self, group: GroupId) {
        self.node(group);
        loop {
            let Some(&child) = self.node(group).children.first() else {
                break;
            };
            self.release(child);
        }

        // unlink from the parent's sibling list before returning any memory
        if let Some(parent) = self.node(group).parent {
            self.node_mut(parent).children.retain(|&id| id != group);
        }

        let node = self.vacate(group);
        trace!("released group {:?}", node.name);
        for _ in &node.tests {
            self.alloc.deallocate(TEST_CHARGE);
        }
        self.alloc.deallocate(GROUP_CHARGE);
    }

    pub fn contains(&self, id: GroupId) -> bool {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
            .is_some()
    }

    pub fn name(&self, id: GroupId) -> &str {
        self.node(id).name.as_ref()
    }

    pub fn parent(&self, id: GroupId) -> Option<GroupId> {
        self.node(id).parent
    }

    pub fn children(&self, id: GroupId) -> impl Iterator<Item = GroupId> + '_ {
        self.node(id).children.iter().copied()
    }

    pub(crate) fn alloc(&self) -> &dyn TreeAlloc {
        self.alloc.as_ref()
    }

    pub(crate) fn node(&self, id: GroupId) -> &GroupNode {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
            .expect("group handle used after release")
    }

    fn node_mut(&mut self, id: GroupId) -> &mut GroupNode {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
            .expect("group handle used after release")
    }

    fn insert(&mut self, node: GroupNode) -> GroupId {
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.node = Some(node);
                GroupId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                GroupId {
                    index,
                    generation: 0,
                }
            }
        }
    }

    fn vacate(&mut self, id: GroupId) -> GroupNode {
        let slot = &mut self.slots[id.index as usize];
        let node = slot
            .node
            .take()
            .expect("group handle used after release");
        slot.generation += 1;
        self.free.push(id.index);
        node
    }
}

impl Default for TestTree {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TestTree {
    fn drop(&mut self) {
        for slot in &mut self.slots {
            if let Some(node) = slot.node.take() {
                for _ in &node.tests {
                    self.alloc.deallocate(TEST_CHARGE);
                }
                self.alloc.deallocate(GROUP_CHARGE);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::alloc::CountingAlloc;

    #[test]
    fn children_and_tests_keep_registration_order() {
        let mut tree = TestTree::new();
        let root = tree.root();
        let b = tree.create_group(root, "b").unwrap();
        let a = tree.create_group(root, "a").unwrap();
        let c = tree.create_group(root, "c").unwrap();
        tree.add_test(a, "second", |_| ()).unwrap();
        tree.add_test(a, "first", |_| ()).unwrap();

        assert_eq!(tree.children(root).collect::<Vec<_>>(), vec![b, a, c]);
        let names: Vec<_> = tree.node(a).tests.iter().map(Test::name).collect();
        assert_eq!(names, vec!["second", "first"]);
    }

    #[test]
    fn release_unlinks_only_the_subtree() {
        let mut tree = TestTree::new();
        let root = tree.root();
        let a = tree.create_group(root, "a").unwrap();
        let a1 = tree.create_group(a, "a1").unwrap();
        let a2 = tree.create_group(a, "a2").unwrap();
        let a1x = tree.create_group(a1, "a1x").unwrap();

        tree.release(a1);

        assert!(!tree.contains(a1));
        assert!(!tree.contains(a1x));
        assert!(tree.contains(a2));
        assert_eq!(tree.children(a).collect::<Vec<_>>(), vec![a2]);
        assert_eq!(tree.parent(a2), Some(a));
    }

    #[test]
    fn released_tree_settles_the_allocator() {
        let alloc = Arc::new(CountingAlloc::new());
        let mut tree = TestTree::with_alloc(alloc.clone()).unwrap();
        let root = tree.root();
        let a = tree.create_group(root, "a").unwrap();
        let b = tree.create_group(a, "b").unwrap();
        tree.add_test(a, "t1", |_| ()).unwrap();
        tree.add_test(b, "t2", |_| ()).unwrap();
        tree.add_test(b, "t3", |_| ()).unwrap();
        assert_eq!(alloc.live_blocks(), 6);

        tree.release(root);
        assert_eq!(alloc.live_blocks(), 0);
        assert_eq!(alloc.live_bytes(), 0);
    }

    #[test]
    fn dropping_the_tree_settles_the_allocator() {
        let alloc = Arc::new(CountingAlloc::new());
        let mut tree = TestTree::with_alloc(alloc.clone()).unwrap();
        let root = tree.root();
        let a = tree.create_group(root, "a").unwrap();
        tree.add_test(a, "t", |_| ()).unwrap();
        assert!(alloc.live_blocks() > 0);

        drop(tree);
        assert_eq!(alloc.live_blocks(), 0);
        assert_eq!(alloc.live_bytes(), 0);
    }

    #[test]
    fn descendants_account_through_the_root_allocator() {
        let alloc = Arc::new(CountingAlloc::new());
        let mut tree = TestTree::with_alloc(alloc.clone()).unwrap();
        let root = tree.root();
        let a = tree.create_group(root, "a").unwrap();
        let deep = tree.create_group(a, "deep").unwrap();
        tree.add_test(deep, "t", |_| ()).unwrap();

        // root + 2 groups + 1 test, all on the one capability
        assert_eq!(alloc.live_blocks(), 4);
    }

    #[test]
    fn refused_charge_fails_group_creation() {
        let alloc = Arc::new(CountingAlloc::new().with_cap(GROUP_CHARGE));
        let mut tree = TestTree::with_alloc(alloc.clone()).unwrap();
        let root = tree.root();

        let err = tree.create_group(root, "a").unwrap_err();
        assert_eq!(err.size, GROUP_CHARGE);
        assert_eq!(alloc.live_blocks(), 1);
        assert_eq!(tree.children(root).count(), 0);
    }

    #[test]
    fn fixtures_replace_on_rewrite() {
        let mut tree = TestTree::new();
        let root = tree.root();
        let g = tree.create_group(root, "g").unwrap();

        tree.set_setup(g, || panic!("should have been replaced"));
        tree.set_setup(g, || {});
        if let Some(setup) = &tree.node(g).setup {
            setup();
        }

        tree.set_teardown(g, || {});
        assert!(tree.node(g).teardown.is_some());
    }

    #[test]
    #[should_panic(expected = "group handle used after release")]
    fn stale_handle_panics() {
        let mut tree = TestTree::new();
        let root = tree.root();
        let g = tree.create_group(root, "g").unwrap();
        tree.release(g);
        tree.name(g);
    }

    #[test]
    fn slots_are_reused_with_fresh_generations() {
        let mut tree = TestTree::new();
        let root = tree.root();
        let old = tree.create_group(root, "old").unwrap();
        tree.release(old);
        let new = tree.create_group(root, "new").unwrap();

        assert_ne!(old, new);
        assert!(!tree.contains(old));
        assert_eq!(tree.name(new), "new");
    }
}
