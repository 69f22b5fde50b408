use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use validator::Validate;

use crate::{
    api::{
        app_state::AppState,
        dto::{
            document_dto::{
                BatchIndexResponse, CreateDocumentRequest, DocumentPageResponse, PageParams,
                StatsResponse, into_documents,
            },
            search_dto::SimilarParams,
        },
    },
    error::AppError,
};

pub async fn create_document(
    State(state): State<AppState>,
    Json(request): Json<CreateDocumentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let document = request.into_document()?;
    let indexed = state.facade.index_one(document).await?;
    Ok((StatusCode::CREATED, Json(indexed)))
}

pub async fn create_documents(
    State(state): State<AppState>,
    Json(requests): Json<Vec<CreateDocumentRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let documents = into_documents(requests)?;
    let indexed = state.facade.index_many(documents).await?;
    info!("Batch indexed {} documents", indexed.len());

    Ok((
        StatusCode::CREATED,
        Json(BatchIndexResponse {
            indexed: indexed.len(),
            documents: indexed,
        }),
    ))
}

pub async fn list_documents(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> Result<impl IntoResponse, AppError> {
    params.validate()?;
    let page = state
        .facade
        .get_all(params.offset(), params.size as usize)
        .await?;

    Ok(Json(DocumentPageResponse {
        documents: page.documents,
        total_hits: page.total_hits,
        page: params.page,
        size: params.size,
    }))
}

pub async fn similar_documents(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<SimilarParams>,
) -> Result<impl IntoResponse, AppError> {
    params.validate()?;
    let page = state.facade.find_similar(&id, params.size as usize).await?;
    Ok(Json(page.documents))
}

pub async fn stats(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let document_count = state.facade.count_all().await?;
    Ok(Json(StatsResponse {
        collection: state.facade.collection().to_string(),
        document_count,
    }))
}
