//! HTTP-level tests for `HttpAuthority` against a mock authority.

use assert_matches::assert_matches;
use mockito::{Matcher, Server};

use notigate_authority::{
    AuthorityClient, AuthorityConfig, AuthorityError, AuthorizationDispatchQueue,
    AuthorizationError, AuthorizationRequest, HttpAuthority,
};

fn client(server: &Server) -> HttpAuthority {
    let config = AuthorityConfig::new(server.url(), "svc@example.com", "hunter2");
    HttpAuthority::new(&config).unwrap()
}

// ---------------------------------------------------------------------------
// Login
// ---------------------------------------------------------------------------

#[tokio::test]
async fn login_posts_credentials_with_token_flag() {
    let mut server = Server::new_async().await;
    let login = server
        .mock("POST", "/user/login")
        .match_query(Matcher::UrlEncoded("token".into(), "true".into()))
        .match_body(Matcher::Json(serde_json::json!({
            "email": "svc@example.com",
            "password": "hunter2",
        })))
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;

    client(&server).login().await.unwrap();
    login.assert_async().await;
}

#[tokio::test]
async fn rejected_login_is_authentication_error() {
    let mut server = Server::new_async().await;
    let _login = server
        .mock("POST", "/user/login")
        .match_query(Matcher::Any)
        .with_status(401)
        .with_body(r#"{"error":"bad credentials"}"#)
        .create_async()
        .await;

    let err = client(&server).login().await.unwrap_err();
    assert_matches!(err, AuthorityError::Authentication { status: 401 });
}

#[tokio::test]
async fn session_cookie_is_sent_on_later_calls() {
    let mut server = Server::new_async().await;
    let _login = server
        .mock("POST", "/user/login")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("set-cookie", "sid=s3cr3t; Path=/")
        .with_body("{}")
        .create_async()
        .await;
    let scope = server
        .mock("POST", "/user/setaccount")
        .match_header("cookie", Matcher::Regex("sid=s3cr3t".into()))
        .match_body(Matcher::Json(serde_json::json!({ "account": "acct1" })))
        .with_status(200)
        .create_async()
        .await;

    let api = client(&server);
    api.login().await.unwrap();
    api.set_account("acct1").await.unwrap();
    scope.assert_async().await;
}

// ---------------------------------------------------------------------------
// Lookups
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fetch_user_decodes_authority_record() {
    let mut server = Server::new_async().await;
    let _user = server
        .mock("GET", "/admin/user/u1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"Email":"u1@example.com","UserID":"u1","FirstName":"Una","LastName":"One",
                "Accounts":["acct1"],"Roles":["Editor"],"JobsList":{"acct1":["job1"]}}"#,
        )
        .create_async()
        .await;

    let user = client(&server).fetch_user("u1").await.unwrap();
    assert_eq!(user.external_user_id, "u1");
    assert_eq!(user.role_in("acct1"), Some("Editor"));
    assert!(user.is_assigned("acct1", "job1"));
}

#[tokio::test]
async fn client_errors_map_to_denials() {
    let mut server = Server::new_async().await;
    let _user = server
        .mock("GET", "/admin/user/ghost")
        .with_status(404)
        .create_async()
        .await;
    let _job = server
        .mock("GET", "/job/job/job404")
        .with_status(404)
        .create_async()
        .await;
    let _account = server
        .mock("POST", "/user/setaccount")
        .with_status(400)
        .create_async()
        .await;

    let api = client(&server);
    assert_matches!(
        api.fetch_user("ghost").await,
        Err(AuthorityError::UserNotFound { user_id }) if user_id == "ghost"
    );
    assert_matches!(
        api.fetch_job("job404").await,
        Err(AuthorityError::JobNotFound { .. })
    );
    assert_matches!(
        api.set_account("acct9").await,
        Err(AuthorityError::AccountScope { .. })
    );
}

#[tokio::test]
async fn expired_session_is_not_a_denial() {
    let mut server = Server::new_async().await;
    let _user = server
        .mock("GET", "/admin/user/u1")
        .with_status(401)
        .create_async()
        .await;
    let _job = server
        .mock("GET", "/job/job/job1")
        .with_status(403)
        .create_async()
        .await;
    let _account = server
        .mock("POST", "/user/setaccount")
        .with_status(401)
        .create_async()
        .await;

    let api = client(&server);
    assert_matches!(
        api.fetch_user("u1").await,
        Err(AuthorityError::Authentication { status: 401 })
    );
    assert_matches!(
        api.fetch_job("job1").await,
        Err(AuthorityError::Authentication { status: 403 })
    );
    assert_matches!(
        api.set_account("acct1").await,
        Err(AuthorityError::Authentication { status: 401 })
    );
}

#[tokio::test]
async fn job_check_ignores_the_body() {
    let mut server = Server::new_async().await;
    let _job = server
        .mock("GET", "/job/job/job1")
        .with_status(200)
        .create_async()
        .await;

    client(&server).fetch_job("job1").await.unwrap();
}

#[tokio::test]
async fn server_errors_are_not_denials() {
    let mut server = Server::new_async().await;
    let _user = server
        .mock("GET", "/admin/user/u1")
        .with_status(502)
        .with_body("bad gateway")
        .create_async()
        .await;

    let err = client(&server).fetch_user("u1").await.unwrap_err();
    assert!(!err.is_denial());
    assert_matches!(err, AuthorityError::Status { status: 502, ref body } if body == "bad gateway");
}

#[tokio::test]
async fn malformed_body_is_decode_error() {
    let mut server = Server::new_async().await;
    let _users = server
        .mock("GET", "/admin/users")
        .with_status(200)
        .with_body("not json")
        .create_async()
        .await;

    assert_matches!(
        client(&server).list_users().await,
        Err(AuthorityError::Decode(_))
    );
}

#[tokio::test]
async fn roleset_is_read_from_account() {
    let mut server = Server::new_async().await;
    let _account = server
        .mock("GET", "/admin/account/acct1")
        .with_status(200)
        .with_body(
            r#"{"AccountName":"Acme","Roleset":{"Roles":{"Editor":{"Permissions":["Stakeholder_Edit"]}}}}"#,
        )
        .create_async()
        .await;

    let roleset = client(&server).fetch_roleset("acct1").await.unwrap();
    assert_eq!(
        roleset.permissions("Editor"),
        Some(&["Stakeholder_Edit".to_string()][..])
    );
}

// ---------------------------------------------------------------------------
// End to end through the queue
// ---------------------------------------------------------------------------

#[tokio::test]
async fn queue_authorizes_over_http() {
    let mut server = Server::new_async().await;
    let login = server
        .mock("POST", "/user/login")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body("{}")
        .expect(1)
        .create_async()
        .await;
    let _scope = server
        .mock("POST", "/user/setaccount")
        .with_status(200)
        .create_async()
        .await;
    let _user = server
        .mock("GET", "/admin/user/u1")
        .with_status(200)
        .with_body(r#"{"UserID":"u1","Accounts":["acct1"],"Roles":["Viewer"]}"#)
        .create_async()
        .await;
    let _account = server
        .mock("GET", "/admin/account/acct1")
        .with_status(200)
        .with_body(r#"{"Roleset":{"Roles":{"Viewer":{"Permissions":["Stakeholder_View"]}}}}"#)
        .create_async()
        .await;

    let mut config = AuthorityConfig::new(server.url(), "svc@example.com", "hunter2");
    config.pool_size = 1;
    let queue = AuthorizationDispatchQueue::connect(&config).unwrap();

    for _ in 0..2 {
        let user = queue
            .submit(AuthorizationRequest::CheckPermission {
                account_id: "acct1".into(),
                user_id: "u1".into(),
                permissions: vec!["Stakeholder_View".into()],
            })
            .await
            .unwrap();
        assert_eq!(user.external_user_id, "u1");
    }

    let denied = queue
        .submit(AuthorizationRequest::CheckPermission {
            account_id: "acct1".into(),
            user_id: "u1".into(),
            permissions: vec!["Stakeholder_Edit".into()],
        })
        .await
        .unwrap_err();
    assert!(denied.is_unauthorized());

    login.assert_async().await;
}

#[tokio::test]
async fn dropped_session_forces_login_on_next_request() {
    let mut server = Server::new_async().await;
    let login = server
        .mock("POST", "/user/login")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body("{}")
        .expect(2)
        .create_async()
        .await;
    let scope = server
        .mock("POST", "/user/setaccount")
        .with_status(401)
        .expect(2)
        .create_async()
        .await;

    let mut config = AuthorityConfig::new(server.url(), "svc@example.com", "hunter2");
    config.pool_size = 1;
    let queue = AuthorizationDispatchQueue::connect(&config).unwrap();

    for _ in 0..2 {
        let err = queue
            .submit(AuthorizationRequest::CheckPermission {
                account_id: "acct1".into(),
                user_id: "u1".into(),
                permissions: vec!["Stakeholder_View".into()],
            })
            .await
            .unwrap_err();
        assert!(!err.is_unauthorized());
        assert_matches!(
            err,
            AuthorizationError::Authority(AuthorityError::Authentication { status: 401 })
        );
    }

    login.assert_async().await;
    scope.assert_async().await;
}
