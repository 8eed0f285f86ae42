//! Root-field query planning.
//!
//! # Responsibilities
//! - Parse the client document and select the operation to run
//! - Derive the operation hash, name and type
//! - Route every root field to the subgraph that owns it
//! - Build one subgraph request per owning subgraph
//!
//! # Design Decisions
//! - A root field belongs to the first subgraph listing it in `root_fields`;
//!   unlisted fields go to the first configured subgraph
//! - When a single subgraph owns every field the client body is forwarded
//!   as is; otherwise each subgraph gets a document holding only its fields,
//!   the fragments they use and the variables they reference
//! - Nested selections are never split across subgraphs

use std::collections::{BTreeSet, HashMap, HashSet};

use axum::body::Bytes;
use graphql_parser::query::{
    parse_query, Definition, Directive, Document, Field, FragmentDefinition, OperationDefinition,
    Selection, SelectionSet, Value,
};
use serde_json::json;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::schema::SubgraphConfig;
use crate::gateway::operation::{
    GraphQLRequest, OperationType, ParsedOperation, PreparedPlan, SubgraphFetch, TypeFieldUsage,
};

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("failed to parse operation: {0}")]
    Parse(String),

    #[error("document contains no operation")]
    NoOperation,

    #[error("operation `{0}` not found in document")]
    UnknownOperation(String),

    #[error("operation name is required when the document contains multiple operations")]
    AmbiguousOperation,

    #[error("fragment `{0}` is not defined")]
    UnknownFragment(String),

    #[error("fragment `{0}` spreads itself")]
    FragmentCycle(String),

    #[error("operation selects no fields")]
    EmptySelection,

    #[error("subscriptions are not supported over HTTP")]
    UnsupportedSubscription,

    #[error("no subgraphs configured")]
    NoSubgraphs,

    #[error("failed to encode subgraph request: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Turns a client request into subgraph fetches.
pub trait Planner: Send + Sync {
    /// Select the operation to execute.
    fn parse(&self, request: &GraphQLRequest) -> Result<ParsedOperation, PlanError>;

    /// Plan `operation`. `body` is the raw client request body.
    fn plan(
        &self,
        operation: &ParsedOperation,
        request: &GraphQLRequest,
        body: &Bytes,
    ) -> Result<PreparedPlan, PlanError>;
}

#[derive(Debug, Clone)]
struct RoutedSubgraph {
    name: String,
    id: String,
    root_fields: HashSet<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RootFieldPlanner {
    subgraphs: Vec<RoutedSubgraph>,
}

type Fragments<'d, 'a> = HashMap<&'d str, &'d FragmentDefinition<'a, String>>;

impl RootFieldPlanner {
    pub fn new(subgraphs: &[SubgraphConfig]) -> Self {
        let subgraphs = subgraphs
            .iter()
            .map(|s| RoutedSubgraph {
                name: s.name.clone(),
                id: s.id().to_string(),
                root_fields: s.root_fields.iter().cloned().collect(),
            })
            .collect();
        Self { subgraphs }
    }

    fn owner(&self, field: &str) -> Option<usize> {
        self.subgraphs
            .iter()
            .position(|s| s.root_fields.contains(field))
            .or_else(|| (!self.subgraphs.is_empty()).then_some(0))
    }
}

/// First 8 bytes of the SHA-256 digest of the document, big-endian.
pub fn operation_hash(document: &str) -> u64 {
    let digest = Sha256::digest(document.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

fn parse_document(query: &str) -> Result<Document<'_, String>, PlanError> {
    parse_query::<String>(query).map_err(|e| PlanError::Parse(e.to_string()))
}

fn describe<'d, 'a>(
    operation: &'d OperationDefinition<'a, String>,
) -> (Option<&'d str>, OperationType, &'d SelectionSet<'a, String>) {
    match operation {
        OperationDefinition::SelectionSet(set) => (None, OperationType::Query, set),
        OperationDefinition::Query(q) => (q.name.as_deref(), OperationType::Query, &q.selection_set),
        OperationDefinition::Mutation(m) => {
            (m.name.as_deref(), OperationType::Mutation, &m.selection_set)
        }
        OperationDefinition::Subscription(s) => {
            (s.name.as_deref(), OperationType::Subscription, &s.selection_set)
        }
    }
}

fn select_operation<'d, 'a>(
    document: &'d Document<'a, String>,
    operation_name: Option<&str>,
) -> Result<&'d OperationDefinition<'a, String>, PlanError> {
    let mut operations = document.definitions.iter().filter_map(|d| match d {
        Definition::Operation(op) => Some(op),
        Definition::Fragment(_) => None,
    });

    match operation_name.filter(|n| !n.is_empty()) {
        Some(name) => operations
            .find(|op| describe(op).0 == Some(name))
            .ok_or_else(|| PlanError::UnknownOperation(name.to_string())),
        None => {
            let first = operations.next().ok_or(PlanError::NoOperation)?;
            if operations.next().is_some() {
                return Err(PlanError::AmbiguousOperation);
            }
            Ok(first)
        }
    }
}

fn fragments<'d, 'a>(document: &'d Document<'a, String>) -> Fragments<'d, 'a> {
    document
        .definitions
        .iter()
        .filter_map(|d| match d {
            Definition::Fragment(f) => Some((f.name.as_str(), f)),
            Definition::Operation(_) => None,
        })
        .collect()
}

/// Root fields of `set`, with root-level fragments flattened. `expanding`
/// holds the fragments on the current spread path.
fn root_fields<'d, 'a>(
    set: &'d SelectionSet<'a, String>,
    fragments: &Fragments<'d, 'a>,
    expanding: &mut HashSet<&'d str>,
    out: &mut Vec<&'d Field<'a, String>>,
) -> Result<(), PlanError> {
    for selection in &set.items {
        match selection {
            Selection::Field(field) if field.name == "__typename" => {}
            Selection::Field(field) => out.push(field),
            Selection::InlineFragment(inline) => {
                root_fields(&inline.selection_set, fragments, expanding, out)?
            }
            Selection::FragmentSpread(spread) => {
                let (&name, &fragment) = fragments
                    .get_key_value(spread.fragment_name.as_str())
                    .ok_or_else(|| PlanError::UnknownFragment(spread.fragment_name.clone()))?;
                if !expanding.insert(name) {
                    return Err(PlanError::FragmentCycle(name.to_string()));
                }
                root_fields(&fragment.selection_set, fragments, expanding, out)?;
                expanding.remove(name);
            }
        }
    }
    Ok(())
}

/// Fragments and variables a selection depends on.
#[derive(Default)]
struct Dependencies {
    fragments: BTreeSet<String>,
    variables: HashSet<String>,
}

impl Dependencies {
    fn visit_value(&mut self, value: &Value<'_, String>) {
        match value {
            Value::Variable(name) => {
                self.variables.insert(name.clone());
            }
            Value::List(items) => items.iter().for_each(|v| self.visit_value(v)),
            Value::Object(fields) => fields.values().for_each(|v| self.visit_value(v)),
            _ => {}
        }
    }

    fn visit_directives(&mut self, directives: &[Directive<'_, String>]) {
        for directive in directives {
            for (_, value) in &directive.arguments {
                self.visit_value(value);
            }
        }
    }

    fn visit_field(&mut self, field: &Field<'_, String>, fragments: &Fragments<'_, '_>) {
        for (_, value) in &field.arguments {
            self.visit_value(value);
        }
        self.visit_directives(&field.directives);
        self.visit_selection_set(&field.selection_set, fragments);
    }

    fn visit_selection_set(&mut self, set: &SelectionSet<'_, String>, fragments: &Fragments<'_, '_>) {
        for selection in &set.items {
            match selection {
                Selection::Field(field) => self.visit_field(field, fragments),
                Selection::InlineFragment(inline) => {
                    self.visit_directives(&inline.directives);
                    self.visit_selection_set(&inline.selection_set, fragments);
                }
                Selection::FragmentSpread(spread) => {
                    self.visit_directives(&spread.directives);
                    if self.fragments.insert(spread.fragment_name.clone()) {
                        if let Some(fragment) = fragments.get(spread.fragment_name.as_str()) {
                            self.visit_directives(&fragment.directives);
                            self.visit_selection_set(&fragment.selection_set, fragments);
                        }
                    }
                }
            }
        }
    }
}

/// Copy of `operation` selecting only `fields`, with unused variable
/// definitions removed.
fn narrow_operation<'a>(
    operation: &OperationDefinition<'a, String>,
    fields: Vec<Selection<'a, String>>,
    variables: &HashSet<String>,
) -> OperationDefinition<'a, String> {
    let narrow = |set: &SelectionSet<'a, String>| SelectionSet {
        span: set.span,
        items: fields.clone(),
    };

    match operation {
        OperationDefinition::SelectionSet(set) => OperationDefinition::SelectionSet(narrow(set)),
        OperationDefinition::Query(q) => {
            let mut q = q.clone();
            q.selection_set = narrow(&q.selection_set);
            q.variable_definitions.retain(|v| variables.contains(&v.name));
            OperationDefinition::Query(q)
        }
        OperationDefinition::Mutation(m) => {
            let mut m = m.clone();
            m.selection_set = narrow(&m.selection_set);
            m.variable_definitions.retain(|v| variables.contains(&v.name));
            OperationDefinition::Mutation(m)
        }
        OperationDefinition::Subscription(s) => {
            let mut s = s.clone();
            s.selection_set = narrow(&s.selection_set);
            s.variable_definitions.retain(|v| variables.contains(&v.name));
            OperationDefinition::Subscription(s)
        }
    }
}

impl Planner for RootFieldPlanner {
    fn parse(&self, request: &GraphQLRequest) -> Result<ParsedOperation, PlanError> {
        let document = parse_document(&request.query)?;
        let operation = select_operation(&document, request.operation_name.as_deref())?;
        let (name, op_type, _) = describe(operation);

        Ok(ParsedOperation {
            id: operation_hash(&request.query),
            name: name.unwrap_or_default().to_string(),
            op_type,
            query: request.query.clone(),
        })
    }

    fn plan(
        &self,
        operation: &ParsedOperation,
        request: &GraphQLRequest,
        body: &Bytes,
    ) -> Result<PreparedPlan, PlanError> {
        if operation.op_type == OperationType::Subscription {
            return Err(PlanError::UnsupportedSubscription);
        }
        if self.subgraphs.is_empty() {
            return Err(PlanError::NoSubgraphs);
        }

        let document = parse_document(&operation.query)?;
        let selected = select_operation(&document, Some(operation.name.as_str()))?;
        let (_, op_type, selection_set) = describe(selected);
        let fragments = fragments(&document);

        let mut fields = Vec::new();
        root_fields(selection_set, &fragments, &mut HashSet::new(), &mut fields)?;
        if fields.is_empty() {
            return Err(PlanError::EmptySelection);
        }

        // Owning subgraph index → its root fields, in first-seen order.
        let mut groups: Vec<(usize, Vec<&Field<'_, String>>)> = Vec::new();
        let mut type_fields = Vec::with_capacity(fields.len());

        for field in fields {
            let owner = self.owner(&field.name).ok_or(PlanError::NoSubgraphs)?;
            match groups.iter_mut().find(|(index, _)| *index == owner) {
                Some((_, owned)) => owned.push(field),
                None => groups.push((owner, vec![field])),
            }
            type_fields.push(TypeFieldUsage {
                path: vec![field.name.clone()],
                type_names: vec![op_type.root_type_name().to_string()],
                subgraph_ids: vec![self.subgraphs[owner].id.clone()],
            });
        }

        let fetches = if groups.len() == 1 {
            vec![SubgraphFetch {
                subgraph: self.subgraphs[groups[0].0].name.clone(),
                body: body.clone(),
            }]
        } else {
            groups
                .into_iter()
                .map(|(owner, owned)| {
                    let query = subgraph_document(selected, &owned, &document, &fragments);
                    let mut payload = json!({ "query": query });
                    if !operation.name.is_empty() {
                        payload["operationName"] = json!(operation.name);
                    }
                    if let Some(variables) = &request.variables {
                        payload["variables"] = variables.clone();
                    }
                    if let Some(extensions) = &request.extensions {
                        payload["extensions"] = extensions.clone();
                    }
                    Ok(SubgraphFetch {
                        subgraph: self.subgraphs[owner].name.clone(),
                        body: Bytes::from(serde_json::to_vec(&payload)?),
                    })
                })
                .collect::<Result<Vec<_>, PlanError>>()?
        };

        Ok(PreparedPlan {
            fetches,
            type_fields,
        })
    }
}

/// Print a document holding `operation` narrowed to `owned`, plus the
/// fragments those fields use.
fn subgraph_document<'a>(
    operation: &OperationDefinition<'a, String>,
    owned: &[&Field<'a, String>],
    document: &Document<'a, String>,
    fragments: &Fragments<'_, 'a>,
) -> String {
    let mut dependencies = Dependencies::default();
    for field in owned {
        dependencies.visit_field(field, fragments);
    }

    let selections = owned.iter().map(|f| Selection::Field((*f).clone())).collect();
    let mut definitions = vec![Definition::Operation(narrow_operation(
        operation,
        selections,
        &dependencies.variables,
    ))];
    definitions.extend(document.definitions.iter().filter_map(|d| match d {
        Definition::Fragment(f) if dependencies.fragments.contains(&f.name) => {
            Some(Definition::Fragment(f.clone()))
        }
        _ => None,
    }));

    Document { definitions }.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subgraph(name: &str, root_fields: &[&str]) -> SubgraphConfig {
        SubgraphConfig {
            name: name.into(),
            id: Some(format!("{}-id", name)),
            routing_url: format!("http://{}.local/graphql", name),
            root_fields: root_fields.iter().map(|f| f.to_string()).collect(),
        }
    }

    fn planner() -> RootFieldPlanner {
        RootFieldPlanner::new(&[
            subgraph("accounts", &["me", "user"]),
            subgraph("products", &["topProducts", "createProduct"]),
        ])
    }

    fn request(query: &str, operation_name: Option<&str>) -> GraphQLRequest {
        GraphQLRequest {
            query: query.into(),
            operation_name: operation_name.map(String::from),
            ..Default::default()
        }
    }

    fn body(request: &GraphQLRequest) -> Bytes {
        Bytes::from(serde_json::to_vec(request).unwrap())
    }

    #[test]
    fn test_parse_named_operation() {
        let req = request("query Me { me { id } }", None);
        let op = planner().parse(&req).unwrap();

        assert_eq!(op.name, "Me");
        assert_eq!(op.op_type, OperationType::Query);
        assert_eq!(op.id, operation_hash("query Me { me { id } }"));
    }

    #[test]
    fn test_parse_selects_by_operation_name() {
        let doc = "query A { me { id } } mutation B { createProduct { id } }";

        let op = planner().parse(&request(doc, Some("B"))).unwrap();
        assert_eq!(op.op_type, OperationType::Mutation);

        assert!(matches!(
            planner().parse(&request(doc, None)),
            Err(PlanError::AmbiguousOperation)
        ));
        assert!(matches!(
            planner().parse(&request(doc, Some("C"))),
            Err(PlanError::UnknownOperation(name)) if name == "C"
        ));
    }

    #[test]
    fn test_parse_anonymous_and_invalid() {
        let op = planner().parse(&request("{ me { id } }", None)).unwrap();
        assert!(op.name.is_empty());

        assert!(matches!(planner().parse(&request("{ me {", None)), Err(PlanError::Parse(_))));
        assert!(matches!(
            planner().parse(&request("fragment F on User { id }", None)),
            Err(PlanError::NoOperation)
        ));
    }

    #[test]
    fn test_hash_is_stable() {
        assert_eq!(operation_hash("{ a }"), operation_hash("{ a }"));
        assert_ne!(operation_hash("{ a }"), operation_hash("{ b }"));
    }

    #[test]
    fn test_single_subgraph_forwards_client_body() {
        let req = request("query Me { me { id } user(id: 1) { name } }", None);
        let body = body(&req);
        let planner = planner();
        let op = planner.parse(&req).unwrap();

        let plan = planner.plan(&op, &req, &body).unwrap();

        assert_eq!(plan.fetches.len(), 1);
        assert_eq!(plan.fetches[0].subgraph, "accounts");
        assert_eq!(plan.fetches[0].body, body);
        assert_eq!(plan.type_fields.len(), 2);
        assert_eq!(plan.type_fields[1].path, vec!["user"]);
        assert_eq!(plan.type_fields[1].type_names, vec!["Query"]);
        assert_eq!(plan.type_fields[1].subgraph_ids, vec!["accounts-id"]);
    }

    #[test]
    fn test_fields_split_across_subgraphs() {
        let mut req = request(
            "query Home($first: Int, $id: ID) { me { ...UserFields } topProducts(first: $first) { upc } } \
             fragment UserFields on User { id name }",
            None,
        );
        req.variables = Some(json!({"first": 5}));
        let planner = planner();
        let op = planner.parse(&req).unwrap();

        let plan = planner.plan(&op, &req, &body(&req)).unwrap();

        assert_eq!(plan.fetches.len(), 2);
        let accounts: serde_json::Value = serde_json::from_slice(&plan.fetches[0].body).unwrap();
        let products: serde_json::Value = serde_json::from_slice(&plan.fetches[1].body).unwrap();

        let accounts_query = accounts["query"].as_str().unwrap();
        assert!(accounts_query.contains("me"));
        assert!(accounts_query.contains("fragment UserFields"));
        assert!(!accounts_query.contains("topProducts"));
        assert!(!accounts_query.contains("$first"));

        let products_query = products["query"].as_str().unwrap();
        assert!(products_query.contains("topProducts"));
        assert!(products_query.contains("$first"));
        assert!(!products_query.contains("UserFields"));
        assert!(!products_query.contains("$id"));
        assert_eq!(products["operationName"], "Home");
        assert_eq!(products["variables"]["first"], 5);
    }

    #[test]
    fn test_unlisted_field_goes_to_first_subgraph() {
        let req = request("{ unknownField }", None);
        let planner = planner();
        let op = planner.parse(&req).unwrap();

        let plan = planner.plan(&op, &req, &body(&req)).unwrap();
        assert_eq!(plan.fetches[0].subgraph, "accounts");
    }

    #[test]
    fn test_plan_errors() {
        let planner = planner();

        let req = request("subscription S { reviewAdded { id } }", None);
        let op = planner.parse(&req).unwrap();
        assert!(matches!(
            planner.plan(&op, &req, &body(&req)),
            Err(PlanError::UnsupportedSubscription)
        ));

        let req = request("{ __typename }", None);
        let op = planner.parse(&req).unwrap();
        assert!(matches!(planner.plan(&op, &req, &body(&req)), Err(PlanError::EmptySelection)));

        let req = request("{ me { id } }", None);
        let op = planner.parse(&req).unwrap();
        assert!(matches!(
            RootFieldPlanner::default().plan(&op, &req, &body(&req)),
            Err(PlanError::NoSubgraphs)
        ));
    }

    #[test]
    fn test_recursive_root_fragments_rejected() {
        let planner = planner();

        let req = request("query Q { ...A } fragment A on Query { ...A }", None);
        let op = planner.parse(&req).unwrap();
        assert!(matches!(
            planner.plan(&op, &req, &body(&req)),
            Err(PlanError::FragmentCycle(name)) if name == "A"
        ));

        let req = request(
            "query Q { ...A } fragment A on Query { me { id } ...B } fragment B on Query { ...A }",
            None,
        );
        let op = planner.parse(&req).unwrap();
        assert!(matches!(
            planner.plan(&op, &req, &body(&req)),
            Err(PlanError::FragmentCycle(_))
        ));
    }

    #[test]
    fn test_repeated_root_fragment_is_not_a_cycle() {
        let req = request("query Q { ...A ...A } fragment A on Query { me { id } }", None);
        let planner = planner();
        let op = planner.parse(&req).unwrap();

        let plan = planner.plan(&op, &req, &body(&req)).unwrap();
        assert_eq!(plan.fetches[0].subgraph, "accounts");
        assert_eq!(plan.type_fields.len(), 2);
    }
}
