//! OpenAPI document generation.

use utoipa::OpenApi;

/// The Stemma API OpenAPI document.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Stemma API",
        description = "Data-lineage and observability engine over manifest/catalog build artifacts"
    ),
    paths(
        crate::routes::dag::get_dag,
        crate::routes::dag::post_dag_action,
        crate::routes::errors::get_errors,
        crate::routes::cache_admin::get_stats,
        crate::routes::cache_admin::post_clear,
    ),
    components(schemas(
        crate::error::ApiErrorBody,
        crate::routes::dag::InvalidateResponse,
        crate::routes::cache_admin::ClearRequest,
        crate::routes::cache_admin::ClearResponse,
    )),
    tags(
        (name = "lineage", description = "Lineage subgraph computation"),
        (name = "errors", description = "Per-node test reports"),
        (name = "cache", description = "Payload cache administration"),
    )
)]
pub struct ApiDoc;

/// Returns the rendered OpenAPI document.
#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}
