//! Index schema definition and the descriptor recovered from a provisioned index.
//!
//! Field and configuration names are a compatibility contract with indexes that already exist
//! in the service; changing any of them orphans those indexes.

use serde::{Deserialize, Serialize};

/// Key field holding the stable document id.
pub const KEY_FIELD: &str = "embedId";
/// Vector field holding the chunk embedding.
pub const VECTOR_FIELD: &str = "embedding";
/// Searchable text field holding the chunk.
pub const CONTENT_FIELD: &str = "token";
/// Field holding the source document name.
pub const SOURCE_FIELD: &str = "title";
/// Semantic configuration name.
pub const SEMANTIC_CONFIG: &str = "semantic_search";
/// Vector search profile name.
pub const VECTOR_PROFILE: &str = "embedding_config";
/// HNSW algorithm configuration name.
pub const ALGORITHM_CONFIG: &str = "embed-algorithms-config";
/// Vectorizer name.
pub const VECTORIZER: &str = "search_vectorizer";
/// Text fields a semantic query searches.
pub const SEMANTIC_SEARCH_FIELDS: &[&str] = &[CONTENT_FIELD, SOURCE_FIELD];

/// Connection details for the index-side vectorizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorizerSettings {
    /// Embedding resource URL.
    pub resource_url: String,
    /// Embedding deployment name.
    pub deployment: String,
    /// Key the service uses to call the deployment.
    pub api_key: Option<String>,
    /// Embedding model name.
    pub model: String,
}

/// Options applied when building a fresh schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaOptions {
    /// Vectorizer bound to the vector profile, if any.
    pub vectorizer: Option<VectorizerSettings>,
    /// Whether to declare the semantic configuration.
    pub semantic: bool,
}

impl Default for SchemaOptions {
    fn default() -> Self {
        Self {
            vectorizer: None,
            semantic: true,
        }
    }
}

/// REST representation of an index definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSchema {
    /// Index name.
    pub name: String,
    /// Field definitions.
    pub fields: Vec<FieldSchema>,
    /// Vector search configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_search: Option<VectorSearch>,
    /// Semantic ranking configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic: Option<SemanticSearch>,
}

/// REST representation of one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSchema {
    /// Field name.
    pub name: String,
    /// EDM type, e.g. `Edm.String`.
    #[serde(rename = "type")]
    pub field_type: String,
    /// Whether this is the document key.
    #[serde(default)]
    pub key: bool,
    /// Whether the field participates in search.
    #[serde(default)]
    pub searchable: bool,
    /// Whether the field is returned in results.
    #[serde(default = "default_true")]
    pub retrievable: bool,
    /// Vector size for vector fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<usize>,
    /// Vector profile for vector fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_search_profile: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Vector search section of an index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorSearch {
    /// Profiles binding algorithms and vectorizers.
    #[serde(default)]
    pub profiles: Vec<VectorProfile>,
    /// Algorithm configurations.
    #[serde(default)]
    pub algorithms: Vec<AlgorithmConfig>,
    /// Vectorizers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vectorizers: Vec<Vectorizer>,
}

/// A vector search profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorProfile {
    /// Profile name.
    pub name: String,
    /// Algorithm configuration name.
    pub algorithm: String,
    /// Vectorizer name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vectorizer: Option<String>,
}

/// An algorithm configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmConfig {
    /// Configuration name.
    pub name: String,
    /// Algorithm kind, `hnsw` here.
    pub kind: String,
}

/// An Azure OpenAI vectorizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vectorizer {
    /// Vectorizer name.
    pub name: String,
    /// Vectorizer kind, `azureOpenAI` here.
    pub kind: String,
    /// Connection parameters.
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "azureOpenAIParameters")]
    pub azure_open_ai_parameters: Option<AzureOpenAiParameters>,
}

/// Parameters of an Azure OpenAI vectorizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AzureOpenAiParameters {
    /// Resource URL.
    pub resource_uri: String,
    /// Deployment id.
    pub deployment_id: String,
    /// Key, omitted when the service uses its managed identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Model name.
    pub model_name: String,
}

/// Semantic section of an index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticSearch {
    /// Configuration used when a query names none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_configuration: Option<String>,
    /// Configurations.
    #[serde(default)]
    pub configurations: Vec<SemanticConfiguration>,
}

/// One semantic configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticConfiguration {
    /// Configuration name.
    pub name: String,
    /// Fields the ranker looks at.
    pub prioritized_fields: PrioritizedFields,
}

/// Fields prioritized by the semantic ranker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrioritizedFields {
    /// Title field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_field: Option<FieldRef>,
    /// Content fields.
    #[serde(default)]
    pub prioritized_content_fields: Vec<FieldRef>,
}

/// A reference to a field by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldRef {
    /// Field name.
    pub field_name: String,
}

impl FieldSchema {
    fn string(name: &str, searchable: bool) -> Self {
        Self {
            name: name.to_string(),
            field_type: "Edm.String".to_string(),
            key: false,
            searchable,
            retrievable: true,
            dimensions: None,
            vector_search_profile: None,
        }
    }
}

impl IndexSchema {
    /// Build the schema for a new index holding `dimensions`-sized vectors.
    pub fn build(name: &str, dimensions: usize, options: &SchemaOptions) -> Self {
        let mut key = FieldSchema::string(KEY_FIELD, false);
        key.key = true;
        let vector = FieldSchema {
            name: VECTOR_FIELD.to_string(),
            field_type: "Collection(Edm.Single)".to_string(),
            key: false,
            searchable: true,
            retrievable: true,
            dimensions: Some(dimensions),
            vector_search_profile: Some(VECTOR_PROFILE.to_string()),
        };

        let vectorizers: Vec<Vectorizer> = options
            .vectorizer
            .iter()
            .map(|settings| Vectorizer {
                name: VECTORIZER.to_string(),
                kind: "azureOpenAI".to_string(),
                azure_open_ai_parameters: Some(AzureOpenAiParameters {
                    resource_uri: settings.resource_url.clone(),
                    deployment_id: settings.deployment.clone(),
                    api_key: settings.api_key.clone(),
                    model_name: settings.model.clone(),
                }),
            })
            .collect();

        let vector_search = VectorSearch {
            profiles: vec![VectorProfile {
                name: VECTOR_PROFILE.to_string(),
                algorithm: ALGORITHM_CONFIG.to_string(),
                vectorizer: (!vectorizers.is_empty()).then(|| VECTORIZER.to_string()),
            }],
            algorithms: vec![AlgorithmConfig {
                name: ALGORITHM_CONFIG.to_string(),
                kind: "hnsw".to_string(),
            }],
            vectorizers,
        };

        let semantic = options.semantic.then(|| SemanticSearch {
            default_configuration: Some(SEMANTIC_CONFIG.to_string()),
            configurations: vec![SemanticConfiguration {
                name: SEMANTIC_CONFIG.to_string(),
                prioritized_fields: PrioritizedFields {
                    title_field: Some(FieldRef {
                        field_name: SOURCE_FIELD.to_string(),
                    }),
                    prioritized_content_fields: vec![FieldRef {
                        field_name: CONTENT_FIELD.to_string(),
                    }],
                },
            }],
        });

        Self {
            name: name.to_string(),
            fields: vec![
                key,
                vector,
                FieldSchema::string(CONTENT_FIELD, true),
                FieldSchema::string(SOURCE_FIELD, true),
            ],
            vector_search: Some(vector_search),
            semantic,
        }
    }
}

/// Identity and configuration of a bound index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDescriptor {
    /// Index name.
    pub name: String,
    /// Declared vector size, if the vector field was found.
    pub vector_dimensions: Option<usize>,
    /// Name of the vector field.
    pub vector_field: String,
    /// Semantic configuration, if declared.
    pub semantic_config: Option<String>,
    /// Vectorizer bound to the vector profile, if any.
    pub vectorizer: Option<String>,
    /// Whether the index stores a source document field.
    pub has_source_field: bool,
}

impl IndexDescriptor {
    /// Recover the descriptor from a schema returned by the service.
    pub fn from_schema(schema: &IndexSchema) -> Self {
        let vector = schema
            .fields
            .iter()
            .find(|field| field.name == VECTOR_FIELD)
            .or_else(|| schema.fields.iter().find(|field| field.dimensions.is_some()));

        let vectorizer = vector
            .and_then(|field| field.vector_search_profile.as_deref())
            .and_then(|profile_name| {
                schema
                    .vector_search
                    .as_ref()?
                    .profiles
                    .iter()
                    .find(|profile| profile.name == profile_name)?
                    .vectorizer
                    .clone()
            });

        let semantic_config = schema.semantic.as_ref().and_then(|semantic| {
            semantic
                .configurations
                .iter()
                .find(|config| config.name == SEMANTIC_CONFIG)
                .or_else(|| semantic.configurations.first())
                .map(|config| config.name.clone())
        });

        Self {
            name: schema.name.clone(),
            vector_dimensions: vector.and_then(|field| field.dimensions),
            vector_field: vector
                .map(|field| field.name.clone())
                .unwrap_or_else(|| VECTOR_FIELD.to_string()),
            semantic_config,
            vectorizer,
            has_source_field: schema.fields.iter().any(|field| field.name == SOURCE_FIELD),
        }
    }

    /// Fields projected into query results.
    pub fn select_fields(&self) -> Vec<String> {
        let mut fields = vec![CONTENT_FIELD.to_string()];
        if self.has_source_field {
            fields.push(SOURCE_FIELD.to_string());
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vectorizer() -> VectorizerSettings {
        VectorizerSettings {
            resource_url: "https://embed.example.com".into(),
            deployment: "text-embedding-3-small".into(),
            api_key: Some("key".into()),
            model: "text-embedding-3-small".into(),
        }
    }

    #[test]
    fn schema_declares_stable_fields() {
        let schema = IndexSchema::build("docs", 100, &SchemaOptions::default());
        let value = serde_json::to_value(&schema).unwrap();

        assert_eq!(value["name"], json!("docs"));
        assert_eq!(
            value["fields"][0],
            json!({
                "name": "embedId",
                "type": "Edm.String",
                "key": true,
                "searchable": false,
                "retrievable": true
            })
        );
        assert_eq!(value["fields"][1]["type"], json!("Collection(Edm.Single)"));
        assert_eq!(value["fields"][1]["dimensions"], json!(100));
        assert_eq!(value["fields"][1]["vectorSearchProfile"], json!("embedding_config"));
        assert_eq!(value["fields"][2]["name"], json!("token"));
        assert_eq!(value["fields"][2]["searchable"], json!(true));
        assert_eq!(
            value["vectorSearch"]["algorithms"],
            json!([{ "name": "embed-algorithms-config", "kind": "hnsw" }])
        );
        assert!(value["vectorSearch"].get("vectorizers").is_none());
        assert!(value["vectorSearch"]["profiles"][0].get("vectorizer").is_none());
        assert_eq!(
            value["semantic"]["configurations"][0]["prioritizedFields"],
            json!({
                "titleField": { "fieldName": "title" },
                "prioritizedContentFields": [ { "fieldName": "token" } ]
            })
        );

        let prioritized = &value["semantic"]["configurations"][0]["prioritizedFields"];
        let mut text_fields: Vec<&str> = SEMANTIC_SEARCH_FIELDS.to_vec();
        text_fields.push(prioritized["titleField"]["fieldName"].as_str().unwrap());
        for content in prioritized["prioritizedContentFields"].as_array().unwrap() {
            text_fields.push(content["fieldName"].as_str().unwrap());
        }
        for name in text_fields {
            let field = schema
                .fields
                .iter()
                .find(|field| field.name == name)
                .unwrap_or_else(|| panic!("field {name} missing"));
            assert!(field.searchable, "{name} must be searchable");
            assert_eq!(field.field_type, "Edm.String");
        }
    }

    #[test]
    fn vectorizer_is_bound_to_profile_when_configured() {
        let options = SchemaOptions {
            vectorizer: Some(vectorizer()),
            semantic: false,
        };
        let value = serde_json::to_value(IndexSchema::build("docs", 3, &options)).unwrap();

        assert_eq!(
            value["vectorSearch"]["profiles"][0]["vectorizer"],
            json!("search_vectorizer")
        );
        assert_eq!(
            value["vectorSearch"]["vectorizers"][0]["azureOpenAIParameters"]["deploymentId"],
            json!("text-embedding-3-small")
        );
        assert!(value.get("semantic").is_none());
    }

    #[test]
    fn descriptor_round_trips_through_service_json() {
        let options = SchemaOptions {
            vectorizer: Some(vectorizer()),
            semantic: true,
        };
        let built = IndexSchema::build("docs", 42, &options);
        let fetched: IndexSchema =
            serde_json::from_value(serde_json::to_value(&built).unwrap()).unwrap();
        let descriptor = IndexDescriptor::from_schema(&fetched);

        assert_eq!(descriptor.name, "docs");
        assert_eq!(descriptor.vector_dimensions, Some(42));
        assert_eq!(descriptor.vector_field, "embedding");
        assert_eq!(descriptor.semantic_config.as_deref(), Some("semantic_search"));
        assert_eq!(descriptor.vectorizer.as_deref(), Some("search_vectorizer"));
        assert_eq!(descriptor.select_fields(), vec!["token", "title"]);
    }

    #[test]
    fn descriptor_handles_sourceless_index() {
        let fetched: IndexSchema = serde_json::from_value(json!({
            "name": "legacy",
            "@odata.etag": "\"0x1\"",
            "fields": [
                { "name": "embedId", "type": "Edm.String", "key": true },
                { "name": "embedding", "type": "Collection(Edm.Single)", "dimensions": 8 },
                { "name": "token", "type": "Edm.String", "searchable": true }
            ]
        }))
        .unwrap();
        let descriptor = IndexDescriptor::from_schema(&fetched);

        assert_eq!(descriptor.vector_dimensions, Some(8));
        assert!(!descriptor.has_source_field);
        assert_eq!(descriptor.semantic_config, None);
        assert_eq!(descriptor.select_fields(), vec!["token"]);
    }
}
