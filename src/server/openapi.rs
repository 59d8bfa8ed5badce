//! OpenAPI document for the REST transport
//!
//! Paths are absolute: procedure routes appear under `/api`, and the auth
//! service's own endpoints, when its schema could be fetched, under
//! `/api/auth` with the `Authentication` tag.

use serde_json::{json, Map, Value};

use crate::config::Settings;
use crate::rpc::ProcedureRouter;

const REST_PREFIX: &str = "/api";
const AUTH_PREFIX: &str = "/api/auth";
const AUTH_TAG: &str = "Authentication";

/// Describe every procedure that declares a REST route, plus the auth
/// service's endpoints from `auth_schema`
pub fn build_document(
    settings: &Settings,
    router: &ProcedureRouter,
    auth_schema: Option<&Value>,
) -> Value {
    let mut paths = Map::new();

    for (name, procedure) in router.iter() {
        let Some(route) = procedure.route() else {
            continue;
        };

        let parameters: Vec<Value> = route
            .path
            .split('/')
            .filter_map(|segment| segment.strip_prefix('{')?.strip_suffix('}'))
            .map(|param| {
                json!({
                    "name": param,
                    "in": "path",
                    "required": true,
                    "schema": { "type": "string" }
                })
            })
            .collect();

        let mut responses = Map::new();
        responses.insert(
            route.success_status.as_u16().to_string(),
            json!({ "description": "Success" }),
        );
        responses.insert("400".into(), error_response("Invalid input"));
        if procedure.requires_auth() {
            responses.insert("401".into(), error_response("Missing or invalid session"));
        }
        responses.insert("500".into(), error_response("Unexpected failure"));

        let mut operation = Map::new();
        operation.insert("operationId".into(), json!(name.replace('/', ".")));
        if let Some(summary) = &route.summary {
            operation.insert("summary".into(), json!(summary));
        }
        if let Some(description) = &route.description {
            operation.insert("description".into(), json!(description));
        }
        if !route.tags.is_empty() {
            operation.insert("tags".into(), json!(route.tags));
        }
        if !parameters.is_empty() {
            operation.insert("parameters".into(), Value::Array(parameters));
        }
        if procedure.requires_auth() {
            operation.insert(
                "security".into(),
                json!([{ "bearerAuth": [] }, { "cookieAuth": [] }]),
            );
        }
        operation.insert("responses".into(), Value::Object(responses));

        let item = paths
            .entry(format!("{}{}", REST_PREFIX, route.path))
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(item) = item {
            item.insert(
                route.method.as_str().to_ascii_lowercase(),
                Value::Object(operation),
            );
        }
    }

    let mut document = json!({
        "openapi": "3.1.0",
        "info": {
            "title": settings.app_name,
            "version": settings.app_version,
        },
        "servers": [{ "url": settings.public_url(), "description": "API Server" }],
        "paths": paths,
        "components": {
            "schemas": {
                "Error": {
                    "type": "object",
                    "required": ["code", "status", "message"],
                    "properties": {
                        "code": { "type": "string" },
                        "status": { "type": "integer" },
                        "message": { "type": "string" },
                        "request_id": { "type": "string" },
                        "data": { "type": "object" }
                    }
                }
            },
            "securitySchemes": {
                "bearerAuth": { "type": "http", "scheme": "bearer" },
                "cookieAuth": { "type": "apiKey", "in": "cookie", "name": "starter.session_token" }
            }
        }
    });

    if let Some(schema) = auth_schema {
        merge_auth_schema(&mut document, schema);
    }

    document
}

/// Mount the auth service's paths under `/api/auth`, tag every operation
/// `Authentication` and add its component schemas without replacing ours
fn merge_auth_schema(document: &mut Value, schema: &Value) {
    let Some(auth_paths) = schema["paths"].as_object() else {
        return;
    };

    let mut merged = 0;
    if let Some(paths) = document["paths"].as_object_mut() {
        for (path, methods) in auth_paths {
            let Some(methods) = methods.as_object() else {
                continue;
            };
            let tagged: Map<String, Value> = methods
                .iter()
                .map(|(method, operation)| {
                    let mut operation = operation.clone();
                    if let Value::Object(fields) = &mut operation {
                        fields.insert("tags".into(), json!([AUTH_TAG]));
                    }
                    (method.clone(), operation)
                })
                .collect();
            paths.insert(format!("{}{}", AUTH_PREFIX, path), Value::Object(tagged));
            merged += 1;
        }
    }

    if let (Some(ours), Some(theirs)) = (
        document["components"]["schemas"].as_object_mut(),
        schema["components"]["schemas"].as_object(),
    ) {
        for (name, definition) in theirs {
            ours.entry(name.clone()).or_insert_with(|| definition.clone());
        }
    }

    if let Value::Object(root) = document {
        root.insert(
            "tags".into(),
            json!([{ "name": AUTH_TAG, "description": "Authentication endpoints" }]),
        );
    }

    tracing::debug!(paths = merged, "Merged auth service paths into the API reference");
}

fn error_response(description: &str) -> Value {
    json!({
        "description": description,
        "content": {
            "application/json": {
                "schema": { "$ref": "#/components/schemas/Error" }
            }
        }
    })
}
