// ABOUTME: End-to-end tests for the PKCE authorization-code flow and token grants
// ABOUTME: Covers replay rejection, PKCE mutation, state fixation, refresh, and expiry
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Vizgate Contributors

mod common;

use anyhow::Result;
use common::{
    authorize_request, build_provider, obtain_code, obtain_tokens, provider_config, query_param,
    token_request, CLIENT_ID, ISSUER, REDIRECT_URI,
};
use std::time::Duration;
use vizgate::oauth2::models::{CallbackParams, TokenRequest};

#[tokio::test]
async fn full_flow_issues_a_verifiable_token() -> Result<()> {
    let provider = build_provider(provider_config());
    let response = obtain_tokens(&provider, Some("workbooks:read viz:content:read")).await;

    assert_eq!(response.token_type, "Bearer");
    assert!(response.expires_in > 0 && response.expires_in <= 3600);
    assert!(response
        .refresh_token
        .as_deref()
        .is_some_and(|rt| rt.starts_with("vz_rt_")));

    let claims = provider.verify_token(&response.access_token).unwrap();
    assert_eq!(claims.iss, ISSUER);
    assert_eq!(claims.aud, ISSUER);
    assert_eq!(claims.sub, "user-42");
    assert!(claims.scope.contains(&"workbooks:read".to_owned()));
    assert!(claims.tokens.access_token.starts_with("up-access-"));
    Ok(())
}

#[tokio::test]
async fn authorize_redirect_carries_composite_state() -> Result<()> {
    let provider = build_provider(provider_config());
    let redirect = provider.authorize(authorize_request(None)).await.unwrap();

    assert!(redirect.location.starts_with("https://upstream.test/"));
    let state = query_param(&redirect.location, "state").unwrap();
    assert!(state.contains(':'));
    Ok(())
}

#[tokio::test]
async fn callback_echoes_the_client_state() -> Result<()> {
    let provider = build_provider(provider_config());
    let redirect = provider.authorize(authorize_request(None)).await.unwrap();
    let state = query_param(&redirect.location, "state").unwrap();

    let callback = provider
        .handle_callback(CallbackParams {
            code: Some("upstream-code-1".into()),
            state: Some(state),
            error: None,
            error_description: None,
        })
        .await
        .unwrap();

    assert!(callback.location.starts_with(REDIRECT_URI));
    assert_eq!(
        query_param(&callback.location, "state").as_deref(),
        Some("client-csrf-token")
    );
    Ok(())
}

#[tokio::test]
async fn callback_rejects_a_tampered_upstream_state() -> Result<()> {
    let provider = build_provider(provider_config());
    let redirect = provider.authorize(authorize_request(None)).await.unwrap();
    let state = query_param(&redirect.location, "state").unwrap();
    let (key, _) = state.split_once(':').unwrap();

    let err = provider
        .handle_callback(CallbackParams {
            code: Some("upstream-code-1".into()),
            state: Some(format!("{key}:forged-upstream-state")),
            error: None,
            error_description: None,
        })
        .await
        .unwrap_err();
    assert_eq!(err.error, "invalid_grant");
    Ok(())
}

#[tokio::test]
async fn callback_rejects_an_unknown_authorization_key() -> Result<()> {
    let provider = build_provider(provider_config());
    let err = provider
        .handle_callback(CallbackParams {
            code: Some("upstream-code-1".into()),
            state: Some("no-such-key:whatever".into()),
            error: None,
            error_description: None,
        })
        .await
        .unwrap_err();
    assert_eq!(err.error, "invalid_grant");
    Ok(())
}

#[tokio::test]
async fn authorization_codes_are_single_use() -> Result<()> {
    let provider = build_provider(provider_config());
    let code = obtain_code(&provider, None).await;

    provider.token(token_request(&code)).await.unwrap();
    let err = provider.token(token_request(&code)).await.unwrap_err();
    assert_eq!(err.error, "invalid_grant");
    Ok(())
}

#[tokio::test]
async fn concurrent_redemption_succeeds_exactly_once() -> Result<()> {
    let provider = std::sync::Arc::new(build_provider(provider_config()));
    let code = obtain_code(&provider, None).await;

    let a = provider.token(token_request(&code));
    let b = provider.token(token_request(&code));
    let (ra, rb) = tokio::join!(a, b);

    assert_eq!(
        usize::from(ra.is_ok()) + usize::from(rb.is_ok()),
        1,
        "exactly one concurrent redemption may win"
    );
    Ok(())
}

#[tokio::test]
async fn mutated_verifier_is_rejected_and_burns_the_code() -> Result<()> {
    let provider = build_provider(provider_config());
    let code = obtain_code(&provider, None).await;

    let mut request = token_request(&code);
    request.code_verifier = Some("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXl".into());
    let err = provider.token(request).await.unwrap_err();
    assert_eq!(err.error, "invalid_grant");

    // Consumption happens before validation, so the code is gone.
    let err = provider.token(token_request(&code)).await.unwrap_err();
    assert_eq!(err.error, "invalid_grant");
    Ok(())
}

#[tokio::test]
async fn redirect_uri_must_match_issuance() -> Result<()> {
    let provider = build_provider(provider_config());
    let code = obtain_code(&provider, None).await;

    let mut request = token_request(&code);
    request.redirect_uri = Some("http://localhost:9400/other".into());
    let err = provider.token(request).await.unwrap_err();
    assert_eq!(err.error, "invalid_grant");
    Ok(())
}

#[tokio::test]
async fn refresh_grant_mints_a_fresh_token_and_is_reusable() -> Result<()> {
    let provider = build_provider(provider_config());
    let issued = obtain_tokens(&provider, None).await;
    let refresh_token = issued.refresh_token.unwrap();

    let refresh = |rt: &str| TokenRequest {
        grant_type: "refresh_token".to_owned(),
        code: None,
        redirect_uri: None,
        code_verifier: None,
        client_id: Some(CLIENT_ID.to_owned()),
        refresh_token: Some(rt.to_owned()),
    };

    let first = provider.token(refresh(&refresh_token)).await.unwrap();
    let second = provider.token(refresh(&refresh_token)).await.unwrap();

    assert!(provider.verify_token(&first.access_token).is_ok());
    assert!(provider.verify_token(&second.access_token).is_ok());
    assert_eq!(first.refresh_token.as_deref(), Some(refresh_token.as_str()));
    Ok(())
}

#[tokio::test]
async fn unknown_refresh_token_is_invalid_grant() -> Result<()> {
    let provider = build_provider(provider_config());
    let err = provider
        .token(TokenRequest {
            grant_type: "refresh_token".to_owned(),
            code: None,
            redirect_uri: None,
            code_verifier: None,
            client_id: None,
            refresh_token: Some("vz_rt_nonexistent".to_owned()),
        })
        .await
        .unwrap_err();
    assert_eq!(err.error, "invalid_grant");
    Ok(())
}

#[tokio::test]
async fn expired_access_tokens_fail_verification() -> Result<()> {
    let mut config = provider_config();
    config.access_token_ttl = Duration::ZERO;
    let provider = build_provider(config);

    let response = obtain_tokens(&provider, None).await;
    let err = provider.verify_token(&response.access_token).unwrap_err();
    assert_eq!(err.error, "invalid_token");
    Ok(())
}

#[tokio::test]
async fn garbage_and_cross_key_tokens_fail_verification() -> Result<()> {
    let provider_a = build_provider(provider_config());
    let provider_b = build_provider(provider_config());

    assert!(provider_a.verify_token("not-a-token").is_err());

    // A token minted under a different encryption key reads as invalid.
    let response = obtain_tokens(&provider_b, None).await;
    let err = provider_a.verify_token(&response.access_token).unwrap_err();
    assert_eq!(err.error, "invalid_token");
    Ok(())
}

#[tokio::test]
async fn authorize_rejects_bad_parameters() -> Result<()> {
    let provider = build_provider(provider_config());

    let mut request = authorize_request(None);
    request.response_type = "token".to_owned();
    assert_eq!(
        provider.authorize(request).await.unwrap_err().error,
        "unsupported_response_type"
    );

    let mut request = authorize_request(None);
    request.code_challenge_method = Some("plain".to_owned());
    assert_eq!(
        provider.authorize(request).await.unwrap_err().error,
        "invalid_request"
    );

    let mut request = authorize_request(None);
    request.redirect_uri = "http://evil.example.com/cb".to_owned();
    assert_eq!(
        provider.authorize(request).await.unwrap_err().error,
        "invalid_request"
    );

    let err = provider
        .authorize(authorize_request(Some("admin:everything")))
        .await
        .unwrap_err();
    assert_eq!(err.error, "invalid_request");
    Ok(())
}

#[tokio::test]
async fn unsupported_grant_type_is_rejected() -> Result<()> {
    let provider = build_provider(provider_config());
    let err = provider
        .token(TokenRequest {
            grant_type: "client_credentials".to_owned(),
            code: None,
            redirect_uri: None,
            code_verifier: None,
            client_id: None,
            refresh_token: None,
        })
        .await
        .unwrap_err();
    assert_eq!(err.error, "unsupported_grant_type");
    Ok(())
}
