#![cfg(feature = "inmem-store")]

mod common;

use actix_web::test;
use common::{bearer, body_json, seeded_repo, setup_env, state, user_with_roles};
use forum::app;
use forum::models::{NewThread, NewAnswer};
use forum::permissions::{ADMIN, USER};
use forum::repo::{AnswerRepo, ChannelRepo, ThreadRepo, UserRepo};
use serde_json::json;
use serial_test::serial;

#[actix_web::test]
#[serial]
async fn blocked_user_is_rejected_on_every_route() {
    setup_env();
    let repo = seeded_repo().await;
    let (user, token) = user_with_roles(&repo, "blocked@example.com", &[ADMIN]).await;
    repo.set_blocked(user.id, true).await.unwrap();
    let app = test::init_service(app(state(&repo))).await;

    let requests = vec![
        test::TestRequest::get().uri("/api/v1/channels"),
        test::TestRequest::post().uri("/api/v1/channels").set_json(json!({"name": "laravel"})),
        test::TestRequest::put().uri("/api/v1/channels").set_json(json!({"id": 1, "name": "x"})),
        test::TestRequest::delete().uri("/api/v1/channels").set_json(json!({"id": 1})),
        test::TestRequest::get().uri("/api/v1/threads"),
        test::TestRequest::get().uri("/api/v1/auth/me"),
        test::TestRequest::get().uri("/docs/openapi.json"),
        test::TestRequest::get().uri("/nope"),
    ];
    for req in requests {
        let resp = test::call_service(&app, req.insert_header(bearer(&token)).to_request()).await;
        assert_eq!(resp.status(), 403);
        assert_eq!(body_json(resp).await, json!({"message": "You are blocked"}));
    }
    assert!(repo.list_channels().await.unwrap().is_empty());

    // the docs stay open to everyone else
    let req = test::TestRequest::get().uri("/docs/openapi.json").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    assert!(body_json(resp).await["paths"]["/api/v1/channels"].is_object());
}

#[actix_web::test]
#[serial]
async fn create_requires_name_and_permission() {
    setup_env();
    let repo = seeded_repo().await;
    let (_, admin) = user_with_roles(&repo, "admin@example.com", &[ADMIN]).await;
    let (_, member) = user_with_roles(&repo, "member@example.com", &[USER]).await;
    let app = test::init_service(app(state(&repo))).await;

    // missing name
    let req = test::TestRequest::post()
        .uri("/api/v1/channels")
        .insert_header(bearer(&admin))
        .set_json(json!({}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 422);
    let v = body_json(resp).await;
    assert_eq!(v["errors"]["name"][0], "The name field is required.");
    assert!(repo.list_channels().await.unwrap().is_empty());

    // permission is checked before the body
    let req = test::TestRequest::post()
        .uri("/api/v1/channels")
        .insert_header(bearer(&member))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);

    // anonymous
    let req = test::TestRequest::post()
        .uri("/api/v1/channels")
        .set_json(json!({"name": "laravel"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
    assert!(repo.list_channels().await.unwrap().is_empty());
}

#[actix_web::test]
#[serial]
async fn channel_lifecycle() {
    setup_env();
    let repo = seeded_repo().await;
    let (_, admin) = user_with_roles(&repo, "admin@example.com", &[ADMIN]).await;
    let app = test::init_service(app(state(&repo))).await;

    let req = test::TestRequest::post()
        .uri("/api/v1/channels")
        .insert_header(bearer(&admin))
        .set_json(json!({"name": "laravel"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let created = body_json(resp).await;
    assert_eq!(created["slug"], "laravel");
    let id = created["id"].as_i64().unwrap();

    // same slug again
    let req = test::TestRequest::post()
        .uri("/api/v1/channels")
        .insert_header(bearer(&admin))
        .set_json(json!({"name": "Laravel"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 409);

    let req = test::TestRequest::put()
        .uri("/api/v1/channels")
        .insert_header(bearer(&admin))
        .set_json(json!({"id": id, "name": "Vue JS"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(body_json(resp).await["slug"], "vue-js");

    let req = test::TestRequest::get().uri(&format!("/api/v1/channels/{id}")).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(body_json(resp).await["name"], "Vue JS");

    let req = test::TestRequest::post()
        .uri("/api/v1/channels")
        .insert_header(bearer(&admin))
        .set_json(json!({"name": "Café Español"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let accented = body_json(resp).await;
    assert_eq!(accented["slug"], "cafe-espanol");
    repo.delete_channel(accented["id"].as_i64().unwrap()).await.unwrap();

    // update with missing id / unknown id
    let req = test::TestRequest::put()
        .uri("/api/v1/channels")
        .insert_header(bearer(&admin))
        .set_json(json!({"name": "react"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 422);
    assert!(body_json(resp).await["errors"]["id"].is_array());
    let req = test::TestRequest::put()
        .uri("/api/v1/channels")
        .insert_header(bearer(&admin))
        .set_json(json!({"id": 9999, "name": "react"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 422);

    // destroy without id leaves the store alone
    let req = test::TestRequest::delete()
        .uri("/api/v1/channels")
        .insert_header(bearer(&admin))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 422);
    assert_eq!(repo.list_channels().await.unwrap().len(), 1);

    let req = test::TestRequest::delete()
        .uri("/api/v1/channels")
        .insert_header(bearer(&admin))
        .set_json(json!({"id": id}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(body_json(resp).await, json!({"message": "channel deleted successfully"}));
    assert!(repo.list_channels().await.unwrap().is_empty());

    // second destroy
    let req = test::TestRequest::delete()
        .uri("/api/v1/channels")
        .insert_header(bearer(&admin))
        .set_json(json!({"id": id}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 422);
}

#[actix_web::test]
#[serial]
async fn nested_channels_and_cascading_delete() {
    setup_env();
    let repo = seeded_repo().await;
    let (admin_user, admin) = user_with_roles(&repo, "admin@example.com", &[ADMIN]).await;
    let app = test::init_service(app(state(&repo))).await;

    let req = test::TestRequest::post()
        .uri("/api/v1/channels")
        .insert_header(bearer(&admin))
        .set_json(json!({"name": "Backend"}))
        .to_request();
    let parent = body_json(test::call_service(&app, req).await).await["id"].as_i64().unwrap();

    let req = test::TestRequest::post()
        .uri("/api/v1/channels")
        .insert_header(bearer(&admin))
        .set_json(json!({"name": "Rust", "parent_id": parent}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let child = body_json(resp).await["id"].as_i64().unwrap();

    let req = test::TestRequest::post()
        .uri("/api/v1/channels")
        .insert_header(bearer(&admin))
        .set_json(json!({"name": "Orphan", "parent_id": 4242}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 422);
    assert!(body_json(resp).await["errors"]["parent_id"].is_array());

    let req = test::TestRequest::get().uri(&format!("/api/v1/channels/{parent}")).to_request();
    let detail = body_json(test::call_service(&app, req).await).await;
    assert_eq!(detail["channels"].as_array().unwrap().len(), 1);
    assert_eq!(detail["channels"][0]["slug"], "rust");

    let thread = repo
        .create_thread(NewThread {
            title: "Hello".into(),
            slug: "hello".into(),
            content: "body".into(),
            publish: true,
            user_id: admin_user.id,
            channel_id: parent,
        })
        .await
        .unwrap();
    repo.create_answer(NewAnswer { content: "hi".into(), thread_id: thread.id, user_id: admin_user.id })
        .await
        .unwrap();

    let req = test::TestRequest::delete()
        .uri("/api/v1/channels")
        .insert_header(bearer(&admin))
        .set_json(json!({"id": parent}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);

    assert!(repo.get_thread(thread.id).await.is_err());
    assert!(repo.list_answers(thread.id).await.unwrap().is_empty());
    assert_eq!(repo.get_channel(child).await.unwrap().parent_id, None);
}
