//! Route compiler.
//!
//! Route paths are split into tokens and folded into a tree of path
//! resources stored in an arena. A node exists once per unique token prefix
//! and its name is its parent's name followed by the titlecased token, so
//! names depend only on the path. Methods declared for `/` attach to the
//! root, which is the API itself and never becomes a resource.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::config::{HttpMethod, MethodConfig, check_path, titlecase};
use crate::error::ConfigError;

/// Index of a node in a [`ResourceGraph`].
pub type NodeId = usize;

/// The root node.
pub const ROOT: NodeId = 0;

/// Headers allowed on CORS preflight responses.
pub const CORS_ALLOWED_HEADERS: &str = "Content-Type,Authorization";

/// A path resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceNode {
    /// Concatenated titlecased tokens from the root, empty for the root.
    pub name: String,
    /// Path token of this node, empty for the root.
    pub token: String,
    /// Parent node, `None` for the root.
    pub parent: Option<NodeId>,
    /// Methods in declaration order, the synthesized `OPTIONS` last.
    pub methods: Vec<MethodNode>,
}

/// A method attached to a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodNode {
    /// HTTP verb.
    pub verb: HttpMethod,
    /// What answers the method.
    pub target: MethodTarget,
}

/// What answers a method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodTarget {
    /// A deployed function.
    Handler {
        /// Function name.
        function: String,
        /// Whether responses carry CORS headers.
        cors: bool,
    },
    /// Synthesized CORS preflight.
    Preflight {
        /// Comma-joined allowed verbs, `OPTIONS` last.
        allowed_methods: String,
    },
}

/// Arena of path resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceGraph {
    nodes: Vec<ResourceNode>,
    by_prefix: HashMap<String, NodeId>,
}

impl Default for ResourceGraph {
    fn default() -> Self {
        Self {
            nodes: vec![ResourceNode {
                name: String::new(),
                token: String::new(),
                parent: None,
                methods: Vec::new(),
            }],
            by_prefix: HashMap::new(),
        }
    }
}

impl ResourceGraph {
    /// Number of nodes, root included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if only the root exists and it has no methods.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1 && self.nodes[ROOT].methods.is_empty()
    }

    /// Returns a node.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&ResourceNode> {
        self.nodes.get(id)
    }

    /// The root node.
    #[must_use]
    pub fn root(&self) -> &ResourceNode {
        &self.nodes[ROOT]
    }

    /// Iterates over every node, root first, parents before children.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &ResourceNode)> {
        self.nodes.iter().enumerate()
    }

    /// Returns true if any node carries a method.
    #[must_use]
    pub fn has_methods(&self) -> bool {
        self.nodes.iter().any(|n| !n.methods.is_empty())
    }

    /// Finds the node of a path.
    #[must_use]
    pub fn find(&self, path: &str) -> Option<NodeId> {
        let key = prefix_key(tokens(path));
        if key.is_empty() {
            Some(ROOT)
        } else {
            self.by_prefix.get(&key).copied()
        }
    }

    /// Full path of a node.
    #[must_use]
    pub fn path_of(&self, id: NodeId) -> String {
        let mut parts = Vec::new();
        let mut current = Some(id);
        while let Some(node) = current.and_then(|i| self.nodes.get(i)) {
            if !node.token.is_empty() {
                parts.push(node.token.as_str());
            }
            current = node.parent;
        }
        parts.reverse();
        format!("/{}", parts.join("/"))
    }

    /// Logical id of a node's resource; the root has none.
    #[must_use]
    pub fn resource_logical_id(&self, id: NodeId) -> Option<String> {
        if id == ROOT {
            return None;
        }
        self.nodes.get(id).map(|n| format!("{}Resource", n.name))
    }

    /// Logical id of a method.
    #[must_use]
    pub fn method_logical_id(&self, id: NodeId, verb: HttpMethod) -> String {
        let verb = titlecase(&verb.to_string().to_ascii_lowercase());
        match self.nodes.get(id) {
            Some(node) if id != ROOT => format!("{}{verb}Method", node.name),
            _ => format!("{verb}RootMethod"),
        }
    }

    /// Returns the child of `parent` for `token`, creating it if needed.
    fn child(
        &mut self,
        parent: NodeId,
        token: &str,
        key: &str,
        names: &mut HashMap<String, String>,
        path: &str,
    ) -> Result<NodeId, ConfigError> {
        if let Some(id) = self.by_prefix.get(key) {
            return Ok(*id);
        }

        let name = format!("{}{}", self.nodes[parent].name, titlecase(token));
        if let Some(other) = names.get(&name) {
            return Err(ConfigError::MalformedPath {
                path: path.to_string(),
                reason: format!("resource name {name} collides with path {other}"),
            });
        }
        names.insert(name.clone(), key.to_string());

        let id = self.nodes.len();
        self.nodes.push(ResourceNode {
            name,
            token: token.to_string(),
            parent: Some(parent),
            methods: Vec::new(),
        });
        self.by_prefix.insert(key.to_string(), id);
        Ok(id)
    }
}

fn tokens(path: &str) -> impl Iterator<Item = &str> {
    path.trim_matches('/').split('/').filter(|t| !t.is_empty())
}

fn prefix_key<'a>(tokens: impl Iterator<Item = &'a str>) -> String {
    tokens.fold(String::new(), |mut key, token| {
        key.push('/');
        key.push_str(token);
        key
    })
}

/// Compiles the route registry into a resource graph.
///
/// Each method's CORS flag is its explicit value, else `default_cors`, else
/// `false`. A node with at least one CORS-enabled method gets exactly one
/// extra `OPTIONS` method listing those methods in declaration order.
///
/// # Errors
///
/// Returns [`ConfigError::MalformedPath`] for malformed paths, methods
/// declared twice for the same node, colliding resource names, or an
/// explicit `OPTIONS` on a node that also needs a preflight.
pub fn compile_routes(
    paths: &IndexMap<String, IndexMap<HttpMethod, MethodConfig>>,
    default_cors: Option<bool>,
) -> Result<ResourceGraph, ConfigError> {
    let mut graph = ResourceGraph::default();
    let mut names: HashMap<String, String> = HashMap::new();

    for (path, methods) in paths {
        check_path(path)?;

        let mut node = ROOT;
        let mut key = String::new();
        for token in tokens(path) {
            key.push('/');
            key.push_str(token);
            node = graph.child(node, token, &key, &mut names, path)?;
        }

        for (verb, binding) in methods {
            let target = &mut graph.nodes[node];
            if target.methods.iter().any(|m| m.verb == *verb) {
                return Err(ConfigError::MalformedPath {
                    path: path.clone(),
                    reason: format!("method {verb} is declared more than once"),
                });
            }

            target.methods.push(MethodNode {
                verb: *verb,
                target: MethodTarget::Handler {
                    function: binding.handler.clone(),
                    cors: binding.cors.or(default_cors).unwrap_or(false),
                },
            });
        }
    }

    for id in 0..graph.nodes.len() {
        let allowed: Vec<String> = graph.nodes[id]
            .methods
            .iter()
            .filter(|m| matches!(m.target, MethodTarget::Handler { cors: true, .. }))
            .map(|m| m.verb.to_string())
            .collect();

        if allowed.is_empty() {
            continue;
        }

        if graph.nodes[id]
            .methods
            .iter()
            .any(|m| m.verb == HttpMethod::Options)
        {
            return Err(ConfigError::MalformedPath {
                path: graph.path_of(id),
                reason: String::from("OPTIONS is declared on a path that needs a CORS preflight"),
            });
        }

        let allowed_methods = format!("{},{}", allowed.join(","), HttpMethod::Options);
        graph.nodes[id].methods.push(MethodNode {
            verb: HttpMethod::Options,
            target: MethodTarget::Preflight { allowed_methods },
        });
    }

    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(handler: &str, cors: Option<bool>) -> MethodConfig {
        MethodConfig {
            handler: handler.to_string(),
            cors,
        }
    }

    fn routes(
        entries: Vec<(&str, Vec<(HttpMethod, Option<bool>)>)>,
    ) -> IndexMap<String, IndexMap<HttpMethod, MethodConfig>> {
        entries
            .into_iter()
            .map(|(path, methods)| {
                let methods = methods
                    .into_iter()
                    .map(|(verb, cors)| (verb, binding("items", cors)))
                    .collect();
                (path.to_string(), methods)
            })
            .collect()
    }

    fn preflight(graph: &ResourceGraph, path: &str) -> Option<String> {
        let node = graph.node(graph.find(path)?)?;
        node.methods.iter().find_map(|m| match &m.target {
            MethodTarget::Preflight { allowed_methods } => Some(allowed_methods.clone()),
            MethodTarget::Handler { .. } => None,
        })
    }

    #[test]
    fn test_shared_prefix_is_reused() {
        let paths = routes(vec![
            ("/items", vec![(HttpMethod::Get, None)]),
            ("/items/list", vec![(HttpMethod::Get, None)]),
        ]);
        let graph = compile_routes(&paths, None).expect("compile");

        assert_eq!(graph.len(), 3);
        let items = graph.find("/items").expect("items");
        let list = graph.find("/items/list").expect("list");
        assert_eq!(graph.node(list).expect("node").parent, Some(items));
        assert_eq!(graph.node(items).expect("node").name, "Items");
        assert_eq!(graph.node(list).expect("node").name, "ItemsList");
        assert_eq!(graph.path_of(list), "/items/list");
    }

    #[test]
    fn test_names_depend_only_on_path() {
        let a = compile_routes(
            &routes(vec![
                ("/users/{id}", vec![(HttpMethod::Get, None)]),
                ("/orders", vec![(HttpMethod::Post, None)]),
            ]),
            None,
        )
        .expect("compile");
        let b = compile_routes(
            &routes(vec![
                ("/orders/", vec![(HttpMethod::Post, None)]),
                ("users/{id}", vec![(HttpMethod::Get, None)]),
            ]),
            None,
        );
        // A path without a leading slash is rejected.
        assert!(b.is_err());

        let b = compile_routes(
            &routes(vec![
                ("/orders/", vec![(HttpMethod::Post, None)]),
                ("/users/{id}", vec![(HttpMethod::Get, None)]),
            ]),
            None,
        )
        .expect("compile");

        let id_a = a.find("/users/{id}").expect("node");
        let id_b = b.find("/users/{id}").expect("node");
        assert_eq!(a.resource_logical_id(id_a), b.resource_logical_id(id_b));
        assert_eq!(a.resource_logical_id(id_a).as_deref(), Some("UsersIdResource"));
    }

    #[test]
    fn test_root_path_attaches_to_root() {
        let graph = compile_routes(&routes(vec![("/", vec![(HttpMethod::Get, None)])]), None)
            .expect("compile");

        assert_eq!(graph.len(), 1);
        assert_eq!(graph.root().methods.len(), 1);
        assert_eq!(graph.resource_logical_id(ROOT), None);
        assert_eq!(graph.method_logical_id(ROOT, HttpMethod::Get), "GetRootMethod");
        assert!(!graph.is_empty());
    }

    #[test]
    fn test_root_path_carries_several_methods() {
        let graph = compile_routes(
            &routes(vec![("/", vec![(HttpMethod::Get, None), (HttpMethod::Put, None)])]),
            None,
        )
        .expect("compile");

        assert_eq!(graph.len(), 1);
        assert_eq!(graph.find("/"), Some(ROOT));
        let verbs: Vec<HttpMethod> = graph.root().methods.iter().map(|m| m.verb).collect();
        assert_eq!(verbs, vec![HttpMethod::Get, HttpMethod::Put]);
        assert_eq!(graph.method_logical_id(ROOT, HttpMethod::Put), "PutRootMethod");
        assert_eq!(preflight(&graph, "/"), None);
    }

    #[test]
    fn test_root_preflight_follows_method_cors() {
        let paths = routes(vec![(
            "/",
            vec![(HttpMethod::Get, Some(false)), (HttpMethod::Put, None)],
        )]);
        let graph = compile_routes(&paths, Some(true)).expect("compile");

        assert_eq!(graph.len(), 1);
        assert_eq!(preflight(&graph, "/").as_deref(), Some("PUT,OPTIONS"));

        let root = graph.root();
        assert_eq!(root.methods.len(), 3);
        assert_eq!(root.methods[2].verb, HttpMethod::Options);
        assert_eq!(
            graph.method_logical_id(ROOT, HttpMethod::Options),
            "OptionsRootMethod"
        );
        assert_eq!(
            root.methods[0].target,
            MethodTarget::Handler {
                function: String::from("items"),
                cors: false,
            }
        );
    }

    #[test]
    fn test_cors_aggregation() {
        let paths = routes(vec![(
            "/items",
            vec![(HttpMethod::Get, Some(false)), (HttpMethod::Put, None)],
        )]);
        let graph = compile_routes(&paths, Some(true)).expect("compile");

        assert_eq!(preflight(&graph, "/items").as_deref(), Some("PUT,OPTIONS"));
        let node = graph.node(graph.find("/items").expect("node")).expect("node");
        assert_eq!(
            node.methods
                .iter()
                .filter(|m| m.verb == HttpMethod::Options)
                .count(),
            1
        );
    }

    #[test]
    fn test_cors_keeps_declaration_order() {
        let paths = routes(vec![(
            "/items",
            vec![
                (HttpMethod::Post, Some(true)),
                (HttpMethod::Get, Some(true)),
                (HttpMethod::Delete, None),
            ],
        )]);
        let graph = compile_routes(&paths, None).expect("compile");
        assert_eq!(preflight(&graph, "/items").as_deref(), Some("POST,GET,OPTIONS"));
    }

    #[test]
    fn test_no_cors_means_no_preflight() {
        let paths = routes(vec![("/items", vec![(HttpMethod::Get, None)])]);
        let graph = compile_routes(&paths, None).expect("compile");
        assert_eq!(preflight(&graph, "/items"), None);
    }

    #[test]
    fn test_name_collision_is_rejected() {
        let paths = routes(vec![
            ("/items/list", vec![(HttpMethod::Get, None)]),
            ("/items-list", vec![(HttpMethod::Get, None)]),
        ]);
        assert!(matches!(
            compile_routes(&paths, None),
            Err(ConfigError::MalformedPath { .. })
        ));
    }

    #[test]
    fn test_duplicate_method_via_trailing_slash() {
        let paths = routes(vec![
            ("/items", vec![(HttpMethod::Get, None)]),
            ("/items/", vec![(HttpMethod::Get, None)]),
        ]);
        assert!(compile_routes(&paths, None).is_err());
    }

    #[test]
    fn test_method_logical_ids() {
        let paths = routes(vec![("/items", vec![(HttpMethod::Delete, None)])]);
        let graph = compile_routes(&paths, None).expect("compile");
        let items = graph.find("/items").expect("node");
        assert_eq!(
            graph.method_logical_id(items, HttpMethod::Delete),
            "ItemsDeleteMethod"
        );
    }
}
