//! Account endpoints: registration, activation and token issuance.
//!
//! These routes are public. They are still subject to the global chain, so
//! rate limiting and CORS apply to them like any other request.
use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    adapters::http_handler::{AppState, JsonBody, MOVIES_READ},
    core::{
        account::{
            hash_password, validate_email, validate_password_plaintext, validate_registration,
            verify_password,
        },
        error::ApiError,
        principal::NewPrincipal,
        token::{TokenScope, generate_token, validate_token_plaintext},
        validator::Validator,
    },
    ports::{
        notifier::ResourceEvent,
        store::{StoreError, bounded},
    },
};

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ActivateRequest {
    pub token: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

/// Token handed back to the client, the only time its plaintext is shown.
#[derive(Debug, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub expiry: chrono::DateTime<chrono::Utc>,
}

/// `POST /v1/users`: create an inactive account with read access and
/// queue its activation token.
pub async fn register_user(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<RegisterRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let mut v = Validator::new();
    validate_registration(&mut v, &input.name, &input.email, &input.password);
    v.into_result()?;

    let password_hash = hash_password(input.password, state.auth.password_cost).await?;
    let principal = bounded(
        state.query_timeout,
        state.principals.register(NewPrincipal {
            name: input.name,
            email: input.email,
            password_hash,
        }),
    )
    .await?;
    let id = principal
        .id()
        .ok_or_else(|| eyre::eyre!("store returned a principal without an id"))?;

    bounded(
        state.query_timeout,
        state.principals.grant_permissions(id, &[MOVIES_READ]),
    )
    .await?;

    let token = generate_token(id, state.auth.activation_ttl(), TokenScope::Activation);
    let plaintext = token
        .plaintext
        .clone()
        .ok_or_else(|| eyre::eyre!("generated token has no plaintext"))?;
    bounded(state.query_timeout, state.principals.insert_token(token)).await?;

    tracing::info!(principal_id = id, "Registered principal");
    state.dispatch(ResourceEvent::PrincipalRegistered {
        id,
        email: principal.email.clone(),
        activation_token: plaintext,
    });

    Ok((StatusCode::ACCEPTED, Json(json!({ "user": principal }))))
}

/// `PUT /v1/users/activated`: redeem an activation token.
pub async fn activate_user(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<ActivateRequest>,
) -> Result<Json<Value>, ApiError> {
    let mut v = Validator::new();
    validate_token_plaintext(&mut v, &input.token);
    v.into_result()?;

    let principal = match bounded(
        state.query_timeout,
        state
            .principals
            .principal_for_token(TokenScope::Activation, &input.token),
    )
    .await
    {
        Ok(principal) => principal,
        Err(StoreError::RecordNotFound) => {
            return Err(ApiError::field_error(
                "token",
                "invalid or expired activation token",
            ));
        }
        Err(e) => return Err(e.into()),
    };
    let id = principal
        .id()
        .ok_or_else(|| eyre::eyre!("activation token resolved to the anonymous principal"))?;

    let principal = bounded(state.query_timeout, state.principals.activate(id)).await?;
    bounded(
        state.query_timeout,
        state.principals.delete_tokens_for(id, TokenScope::Activation),
    )
    .await?;

    tracing::info!(principal_id = id, "Activated principal");
    Ok(Json(json!({ "user": principal })))
}

/// `POST /v1/tokens/authentication`: exchange email and password for a
/// bearer token.
pub async fn create_authentication_token(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<CredentialsRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let mut v = Validator::new();
    validate_email(&mut v, &input.email);
    validate_password_plaintext(&mut v, &input.password);
    v.into_result()?;

    let credentials = match bounded(
        state.query_timeout,
        state.principals.credentials_for_email(&input.email),
    )
    .await
    {
        Ok(credentials) => credentials,
        Err(StoreError::RecordNotFound) => return Err(ApiError::InvalidCredentials),
        Err(e) => return Err(e.into()),
    };

    if !verify_password(input.password, credentials.password_hash).await? {
        return Err(ApiError::InvalidCredentials);
    }
    let id = credentials
        .principal
        .id()
        .ok_or_else(|| eyre::eyre!("credentials resolved to the anonymous principal"))?;

    let token = generate_token(
        id,
        state.auth.authentication_ttl(),
        TokenScope::Authentication,
    );
    let issued = IssuedToken {
        token: token
            .plaintext
            .clone()
            .ok_or_else(|| eyre::eyre!("generated token has no plaintext"))?,
        expiry: token.expiry,
    };
    bounded(state.query_timeout, state.principals.insert_token(token)).await?;

    tracing::info!(principal_id = id, "Issued authentication token");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "authentication_token": issued })),
    ))
}
