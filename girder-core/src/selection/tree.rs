// Decision tree over route values used to find conventional action candidates

use crate::action_descriptor::{ActionDescriptor, ActionDescriptorCollection, ActionDescriptorCollectionProvider};
use crate::route::{RouteValues, normalize_value};
use arc_swap::ArcSwap;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

/// Extracts the key/value criteria an item requires.
///
/// Keys and values must already be normalized.
pub trait DecisionTreeClassifier<T> {
    fn get_criteria(&self, item: &T) -> BTreeMap<String, String>;
}

/// A node of the tree.
#[derive(Debug, Clone)]
pub struct DecisionTreeNode<T> {
    /// Items whose criteria are all satisfied on the path to this node
    pub matches: Vec<T>,
    pub criteria: Vec<DecisionCriterion<T>>,
}

/// Branches on the value of one key.
#[derive(Debug, Clone)]
pub struct DecisionCriterion<T> {
    pub key: String,
    pub branches: HashMap<String, DecisionTreeNode<T>>,
}

struct ItemDescriptor<'a, T> {
    index: usize,
    item: &'a T,
    criteria: BTreeMap<String, String>,
}

#[derive(Default)]
struct TreeBuilderContext {
    current_criteria: BTreeSet<String>,
    matched_items: HashSet<usize>,
}

impl TreeBuilderContext {
    fn child(&self, key: &str) -> Self {
        let mut current_criteria = self.current_criteria.clone();
        current_criteria.insert(key.to_string());
        Self {
            current_criteria,
            matched_items: HashSet::new(),
        }
    }
}

/// Build a tree grouping `items` by shared criteria.
///
/// Criteria with more distinct values branch first, so the most selective
/// keys are near the root.
pub fn generate_tree<T, C>(items: &[T], classifier: &C) -> DecisionTreeNode<T>
where
    T: Clone,
    C: DecisionTreeClassifier<T>,
{
    let descriptors: Vec<ItemDescriptor<'_, T>> = items
        .iter()
        .enumerate()
        .map(|(index, item)| ItemDescriptor {
            index,
            item,
            criteria: classifier.get_criteria(item),
        })
        .collect();
    let all: Vec<&ItemDescriptor<'_, T>> = descriptors.iter().collect();

    generate_node(&mut TreeBuilderContext::default(), &all)
}

fn generate_node<T: Clone>(
    context: &mut TreeBuilderContext,
    items: &[&ItemDescriptor<'_, T>],
) -> DecisionTreeNode<T> {
    // key -> value -> items requiring that value
    let mut criteria: BTreeMap<&str, BTreeMap<&str, Vec<&ItemDescriptor<'_, T>>>> = BTreeMap::new();
    let mut matches = Vec::new();

    for item in items {
        let mut has_unsatisfied_criteria = false;
        for (key, value) in &item.criteria {
            if context.current_criteria.contains(key) {
                continue;
            }
            has_unsatisfied_criteria = true;
            criteria
                .entry(key.as_str())
                .or_default()
                .entry(value.as_str())
                .or_default()
                .push(*item);
        }

        if !has_unsatisfied_criteria {
            matches.push(item.item.clone());
        }
    }

    let mut ordered: Vec<_> = criteria.into_iter().collect();
    ordered.sort_by(|a, b| b.1.len().cmp(&a.1.len()));

    let mut reduced = Vec::new();
    for (key, branches) in ordered {
        let mut reduced_branches = HashMap::new();
        for (value, branch) in branches {
            let mut has_new_items = false;
            for item in &branch {
                if context.matched_items.insert(item.index) {
                    has_new_items = true;
                }
            }

            if has_new_items {
                let mut child = context.child(key);
                reduced_branches.insert(value.to_string(), generate_node(&mut child, &branch));
            }
        }

        if !reduced_branches.is_empty() {
            reduced.push(DecisionCriterion {
                key: key.to_string(),
                branches: reduced_branches,
            });
        }
    }

    DecisionTreeNode {
        matches,
        criteria: reduced,
    }
}

// ============================================================================
// Action selection tree
// ============================================================================

struct RouteValueClassifier;

impl DecisionTreeClassifier<Arc<ActionDescriptor>> for RouteValueClassifier {
    fn get_criteria(&self, item: &Arc<ActionDescriptor>) -> BTreeMap<String, String> {
        item.route_values
            .iter()
            .map(|(key, value)| (key.to_string(), normalize_value(value)))
            .collect()
    }
}

/// Finds conventionally routed actions whose required route values match.
pub struct ActionSelectionDecisionTree {
    version: u64,
    root: DecisionTreeNode<Arc<ActionDescriptor>>,
}

impl ActionSelectionDecisionTree {
    pub fn new(collection: &ActionDescriptorCollection) -> Self {
        let conventional: Vec<Arc<ActionDescriptor>> = collection
            .items
            .iter()
            .filter(|action| !action.is_attribute_routed())
            .cloned()
            .collect();

        Self {
            version: collection.version,
            root: generate_tree(&conventional, &RouteValueClassifier),
        }
    }

    /// Version of the collection this tree was built from
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Actions whose route value requirements are met by `route_values`,
    /// without duplicates.
    ///
    /// Missing and null values compare equal to `""`.
    pub fn select(&self, route_values: &RouteValues) -> Vec<Arc<ActionDescriptor>> {
        let mut results = Vec::new();
        let mut seen = HashSet::new();
        walk(&self.root, route_values, &mut results, &mut seen);
        results
    }
}

fn walk(
    node: &DecisionTreeNode<Arc<ActionDescriptor>>,
    route_values: &RouteValues,
    results: &mut Vec<Arc<ActionDescriptor>>,
    seen: &mut HashSet<*const ActionDescriptor>,
) {
    for action in &node.matches {
        if seen.insert(Arc::as_ptr(action)) {
            results.push(Arc::clone(action));
        }
    }

    for criterion in &node.criteria {
        let value = normalize_value(route_values.get(&criterion.key));
        if let Some(branch) = criterion.branches.get(&value) {
            walk(branch, route_values, results, seen);
        }
    }
}

/// Keeps the decision tree in step with the action collection.
pub struct ActionSelectorDecisionTreeProvider {
    collection_provider: Arc<ActionDescriptorCollectionProvider>,
    current: ArcSwap<ActionSelectionDecisionTree>,
}

impl ActionSelectorDecisionTreeProvider {
    pub fn new(collection_provider: Arc<ActionDescriptorCollectionProvider>) -> Self {
        let tree = ActionSelectionDecisionTree::new(&collection_provider.collection());
        Self {
            collection_provider,
            current: ArcSwap::from_pointee(tree),
        }
    }

    /// Tree for the current collection, rebuilt when the version moved.
    pub fn decision_tree(&self) -> Arc<ActionSelectionDecisionTree> {
        let collection = self.collection_provider.collection();
        let tree = self.current.load_full();
        if tree.version() == collection.version {
            return tree;
        }

        let fresh = Arc::new(ActionSelectionDecisionTree::new(&collection));
        let previous = self.current.compare_and_swap(&tree, Arc::clone(&fresh));
        if Arc::ptr_eq(&*previous, &tree) {
            tracing::debug!(version = collection.version, "Rebuilt action selection decision tree");
        }
        fresh
    }
}
