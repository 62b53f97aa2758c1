//! Query executor: the node protocol, the node kinds and the driver.

mod bitmap_scan;
pub mod hash;
mod instrument;
mod node;
mod protocol;
mod runner;
mod seq_scan;
mod subquery_scan;

pub use bitmap_scan::{BitmapAndNode, BitmapIndexScanNode, BitmapOrNode};
pub use hash::{HashLookup, HashNode, HashTable, HashTableConfig, KeyHasher};
pub use instrument::Instrumentation;
pub use node::ExecNode;
pub use protocol::{Capabilities, ExecFlags, Lifecycle, NodeBase, NodeKind, NodeState};
pub use runner::{execute, NodeStats, QueryOutput};
pub use seq_scan::SeqScanNode;
pub use subquery_scan::SubqueryScanNode;
