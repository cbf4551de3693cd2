//! Tree and forest representations.
//!
//! - [`Tree`] / [`Forest`]: float models as produced by training.
//! - [`QuantizedTree`] / [`QuantizedForest`]: integer models evaluated on
//!   quantized inputs, the source of circuit lowering.

/// Node identifier: an index into a tree's structure-of-arrays storage.
pub type NodeId = u32;

pub mod forest;
pub mod quantized;
pub mod tree;

pub use forest::{Forest, ForestValidationError};
pub use quantized::{QuantizedForest, QuantizedTree};
pub use tree::{Tree, TreeBuilder, TreeValidationError};

/// Build a [`Tree`] from a node listing.
///
/// ```
/// let tree = quantree::class_tree! {
///     0 => split(0, 0.5) -> 1, 2,
///     1 => leaf[0.9, 0.1],
///     2 => leaf[0.2, 0.8],
/// };
/// assert_eq!(tree.n_leaves(), 2);
/// ```
#[macro_export]
macro_rules! class_tree {
    (@node $b:ident, $id:literal, split ($feature:expr, $threshold:expr), $left:literal, $right:literal) => {
        $b.split($id, $feature, $threshold, $left, $right);
    };
    (@node $b:ident, $id:literal, leaf [$($v:expr),* $(,)?]) => {
        $b.leaf($id, vec![$($v),*]);
    };
    ($($id:literal => $kind:ident $args:tt $(-> $left:literal, $right:literal)?),+ $(,)?) => {{
        let mut builder = $crate::repr::TreeBuilder::default();
        $( $crate::class_tree!(@node builder, $id, $kind $args $(, $left, $right)?); )+
        builder.build()
    }};
}
