//! Scene collaborator contract
//!
//! The cache only needs a narrow view of the scene: enumerate storable nodes,
//! read the file each of their storage nodes points at, and flag a node as
//! modified since read. [`Scene`] and [`StorableNode`] capture exactly that so
//! the cache manager can be driven by any scene implementation.
//!
//! [`MemoryScene`] is a small in-memory implementation. The command line loads
//! it from a JSON document, and the tests use it as a fake scene.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::SceneResult;

/// Closed set of node kinds the cache cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeClass {
    /// Any node that can carry storage references
    Storable,
    Volume,
    Model,
    FiberBundle,
    Transform,
    ColorTable,
}

impl NodeClass {
    /// Whether a node of kind `other` is returned by a query for `self`
    pub fn matches(self, other: NodeClass) -> bool {
        self == NodeClass::Storable || self == other
    }
}

/// One concrete file/URI location for a storable node's data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageNode {
    /// Local file name, absolute or relative to the scene root directory
    pub file_name: PathBuf,
    /// Remote or `file://` location of the data, if any
    #[serde(default)]
    pub uri: Option<String>,
}

impl StorageNode {
    /// Storage node backed by a local file only
    pub fn with_file(file_name: impl Into<PathBuf>) -> Self {
        Self {
            file_name: file_name.into(),
            uri: None,
        }
    }

    /// Storage node backed by a URI that is staged into `file_name`
    pub fn with_uri(uri: impl Into<String>, file_name: impl Into<PathBuf>) -> Self {
        Self {
            file_name: file_name.into(),
            uri: Some(uri.into()),
        }
    }

    /// Resolve the file name against the scene root when it is relative
    pub fn full_name_from_file_name(&self, root_directory: Option<&Path>) -> PathBuf {
        match root_directory {
            Some(root) if self.file_name.is_relative() => root.join(&self.file_name),
            _ => self.file_name.clone(),
        }
    }
}

/// A scene entity whose data lives in one or more storage locations
pub trait StorableNode {
    /// Unique node identifier within the scene
    fn id(&self) -> &str;

    /// Kind tag used by class queries
    fn class(&self) -> NodeClass;

    /// Storage nodes attached to this node
    fn storage_nodes(&self) -> &[StorageNode];

    /// Whether in-memory state may no longer match the backing file
    fn modified_since_read(&self) -> bool;

    /// Set the modified-since-read flag
    fn set_modified_since_read(&mut self, modified: bool);
}

/// Read/flag access to the nodes of a scene
pub trait Scene {
    /// Directory relative storage file names are resolved against
    fn root_directory(&self) -> Option<&Path> {
        None
    }

    /// Look up a node by id
    fn node(&self, id: &str) -> Option<&dyn StorableNode>;

    /// Mutable access to every node matching `class`
    fn nodes_by_class_mut(&mut self, class: NodeClass) -> Vec<&mut dyn StorableNode>;

    /// Ids of every node matching `class`
    fn node_ids_by_class(&self, class: NodeClass) -> Vec<String>;
}

/// Plain storable node held by [`MemoryScene`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneNode {
    pub id: String,
    pub class: NodeClass,
    #[serde(default)]
    pub storage: Vec<StorageNode>,
    #[serde(default)]
    pub modified_since_read: bool,
}

impl SceneNode {
    /// Create a node without storage
    pub fn new(id: impl Into<String>, class: NodeClass) -> Self {
        Self {
            id: id.into(),
            class,
            storage: Vec::new(),
            modified_since_read: false,
        }
    }

    /// Attach a storage node
    pub fn with_storage(mut self, storage: StorageNode) -> Self {
        self.storage.push(storage);
        self
    }
}

impl StorableNode for SceneNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn class(&self) -> NodeClass {
        self.class
    }

    fn storage_nodes(&self) -> &[StorageNode] {
        &self.storage
    }

    fn modified_since_read(&self) -> bool {
        self.modified_since_read
    }

    fn set_modified_since_read(&mut self, modified: bool) {
        self.modified_since_read = modified;
    }
}

/// In-memory scene
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryScene {
    #[serde(default)]
    pub root_directory: Option<PathBuf>,
    #[serde(default)]
    pub nodes: Vec<SceneNode>,
}

impl MemoryScene {
    /// Create an empty scene
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a scene from a JSON document
    pub fn from_json_file(path: &Path) -> SceneResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Add a node, returning its id
    pub fn add_node(&mut self, node: SceneNode) -> String {
        let id = node.id.clone();
        self.nodes.push(node);
        id
    }

    /// Concrete node access for callers that hold a `MemoryScene`
    pub fn get(&self, id: &str) -> Option<&SceneNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Ids of nodes currently flagged as modified since read
    pub fn modified_node_ids(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|n| n.modified_since_read)
            .map(|n| n.id.clone())
            .collect()
    }
}

impl Scene for MemoryScene {
    fn root_directory(&self) -> Option<&Path> {
        self.root_directory.as_deref()
    }

    fn node(&self, id: &str) -> Option<&dyn StorableNode> {
        self.get(id).map(|n| n as &dyn StorableNode)
    }

    fn nodes_by_class_mut(&mut self, class: NodeClass) -> Vec<&mut dyn StorableNode> {
        self.nodes
            .iter_mut()
            .filter(|n| class.matches(n.class))
            .map(|n| n as &mut dyn StorableNode)
            .collect()
    }

    fn node_ids_by_class(&self, class: NodeClass) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|n| class.matches(n.class))
            .map(|n| n.id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_scene() -> MemoryScene {
        let mut scene = MemoryScene::new();
        scene.root_directory = Some(PathBuf::from("/data/scene"));
        scene.add_node(
            SceneNode::new("volume1", NodeClass::Volume)
                .with_storage(StorageNode::with_file("brain.nrrd")),
        );
        scene.add_node(
            SceneNode::new("model1", NodeClass::Model)
                .with_storage(StorageNode::with_uri("http://host/skull.vtk", "/tmp/skull.vtk")),
        );
        scene
    }

    #[test]
    fn test_storable_class_matches_everything() {
        let scene = sample_scene();
        assert_eq!(scene.node_ids_by_class(NodeClass::Storable).len(), 2);
        assert_eq!(scene.node_ids_by_class(NodeClass::Model), vec!["model1"]);
        assert!(scene.node_ids_by_class(NodeClass::Transform).is_empty());
    }

    #[test]
    fn test_full_name_resolution() {
        let relative = StorageNode::with_file("brain.nrrd");
        assert_eq!(
            relative.full_name_from_file_name(Some(Path::new("/data/scene"))),
            PathBuf::from("/data/scene/brain.nrrd")
        );
        assert_eq!(relative.full_name_from_file_name(None), PathBuf::from("brain.nrrd"));

        let absolute = StorageNode::with_file("/tmp/skull.vtk");
        assert_eq!(
            absolute.full_name_from_file_name(Some(Path::new("/data/scene"))),
            PathBuf::from("/tmp/skull.vtk")
        );
    }

    #[test]
    fn test_mark_through_trait() {
        let mut scene = sample_scene();
        for node in scene.nodes_by_class_mut(NodeClass::Volume) {
            node.set_modified_since_read(true);
        }
        assert_eq!(scene.modified_node_ids(), vec!["volume1"]);
        assert!(!scene.node("model1").unwrap().modified_since_read());
    }

    #[test]
    fn test_scene_json_document() {
        let json = r#"{
            "root_directory": "/data/scene",
            "nodes": [
                {"id": "fibers", "class": "fiber_bundle",
                 "storage": [{"file_name": "tracts.vtk", "uri": "http://host/tracts.vtk"}]}
            ]
        }"#;
        let scene: MemoryScene = serde_json::from_str(json).unwrap();
        let node = scene.get("fibers").unwrap();
        assert_eq!(node.class, NodeClass::FiberBundle);
        assert!(!node.modified_since_read);
        assert_eq!(node.storage[0].uri.as_deref(), Some("http://host/tracts.vtk"));
    }
}
