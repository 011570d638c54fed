#![cfg(feature = "inmem-store")]

mod common;

use actix_web::test;
use common::{bearer, body_json, seeded_repo, setup_env, state, user_with_roles};
use forum::app;
use forum::models::NewChannel;
use forum::permissions::{ADMIN, USER};
use forum::repo::{inmem::InMemRepo, AnswerRepo, ChannelRepo, ThreadRepo};
use serde_json::json;
use serial_test::serial;

async fn channel(repo: &InMemRepo, slug: &str) -> i64 {
    repo.create_channel(NewChannel { name: slug.into(), slug: slug.into(), parent_id: None })
        .await
        .unwrap()
        .id
}

#[actix_web::test]
#[serial]
async fn thread_flow_with_answers_and_best_answer() {
    setup_env();
    let repo = seeded_repo().await;
    let channel_id = channel(&repo, "rust").await;
    let (_, author) = user_with_roles(&repo, "author@example.com", &[USER]).await;
    let (_, helper) = user_with_roles(&repo, "helper@example.com", &[USER]).await;
    let app = test::init_service(app(state(&repo))).await;

    let req = test::TestRequest::post()
        .uri("/api/v1/threads")
        .insert_header(bearer(&author))
        .set_json(json!({"title": "Borrow checker woes", "content": "help", "channel_id": channel_id}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let thread = body_json(resp).await;
    assert_eq!(thread["slug"], "borrow-checker-woes");
    assert_eq!(thread["publish"], true);
    let thread_id = thread["id"].as_i64().unwrap();

    let req = test::TestRequest::post()
        .uri("/api/v1/answers")
        .insert_header(bearer(&helper))
        .set_json(json!({"content": "clone it", "thread_id": thread_id}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let answer_id = body_json(resp).await["id"].as_i64().unwrap();

    let req = test::TestRequest::get().uri(&format!("/api/v1/threads/{thread_id}/answers")).to_request();
    let answers = body_json(test::call_service(&app, req).await).await;
    assert_eq!(answers.as_array().unwrap().len(), 1);

    // only the owner picks the best answer
    let req = test::TestRequest::put()
        .uri(&format!("/api/v1/threads/{thread_id}/best-answer"))
        .insert_header(bearer(&helper))
        .set_json(json!({"answer_id": answer_id}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);

    let req = test::TestRequest::put()
        .uri(&format!("/api/v1/threads/{thread_id}/best-answer"))
        .insert_header(bearer(&author))
        .set_json(json!({"answer_id": answer_id}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(body_json(resp).await["best_answer_id"], answer_id);

    // deleting the answer clears the marker
    let req = test::TestRequest::delete()
        .uri(&format!("/api/v1/answers/{answer_id}"))
        .insert_header(bearer(&helper))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);
    assert_eq!(repo.get_thread(thread_id).await.unwrap().best_answer_id, None);
}

#[actix_web::test]
#[serial]
async fn best_answer_must_belong_to_thread() {
    setup_env();
    let repo = seeded_repo().await;
    let channel_id = channel(&repo, "go").await;
    let (_, author) = user_with_roles(&repo, "author@example.com", &[USER]).await;
    let app = test::init_service(app(state(&repo))).await;

    let mut ids = Vec::new();
    for title in ["first", "second"] {
        let req = test::TestRequest::post()
            .uri("/api/v1/threads")
            .insert_header(bearer(&author))
            .set_json(json!({"title": title, "content": "c", "channel_id": channel_id}))
            .to_request();
        ids.push(body_json(test::call_service(&app, req).await).await["id"].as_i64().unwrap());
    }
    let req = test::TestRequest::post()
        .uri("/api/v1/answers")
        .insert_header(bearer(&author))
        .set_json(json!({"content": "self answer", "thread_id": ids[1]}))
        .to_request();
    let answer_id = body_json(test::call_service(&app, req).await).await["id"].as_i64().unwrap();

    let req = test::TestRequest::put()
        .uri(&format!("/api/v1/threads/{}/best-answer", ids[0]))
        .insert_header(bearer(&author))
        .set_json(json!({"answer_id": answer_id}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 422);
    assert!(body_json(resp).await["errors"]["answer_id"].is_array());
}

#[actix_web::test]
#[serial]
async fn validation_and_unknown_references() {
    setup_env();
    let repo = seeded_repo().await;
    let (_, author) = user_with_roles(&repo, "author@example.com", &[USER]).await;
    let app = test::init_service(app(state(&repo))).await;

    let req = test::TestRequest::post()
        .uri("/api/v1/threads")
        .insert_header(bearer(&author))
        .set_json(json!({"title": "  ", "channel_id": 77}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 422);
    let v = body_json(resp).await;
    assert!(v["errors"]["title"].is_array());
    assert!(v["errors"]["content"].is_array());
    assert_eq!(v["errors"]["channel_id"][0], "The selected channel id is invalid.");

    let req = test::TestRequest::post()
        .uri("/api/v1/answers")
        .insert_header(bearer(&author))
        .set_json(json!({"content": "orphan", "thread_id": 12345}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 422);

    let req = test::TestRequest::get().uri("/api/v1/threads/12345/answers").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);

    // unreadable body
    let req = test::TestRequest::post()
        .uri("/api/v1/threads")
        .insert_header(bearer(&author))
        .insert_header(("Content-Type", "application/json"))
        .set_payload("{not json")
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 422);
}

#[actix_web::test]
#[serial]
async fn unpublished_threads_and_moderation() {
    setup_env();
    let repo = seeded_repo().await;
    let channel_id = channel(&repo, "drafts").await;
    let (_, author) = user_with_roles(&repo, "author@example.com", &[USER]).await;
    let (_, other) = user_with_roles(&repo, "other@example.com", &[USER]).await;
    let (_, moderator) = user_with_roles(&repo, "mod@example.com", &[ADMIN]).await;
    let app = test::init_service(app(state(&repo))).await;

    let req = test::TestRequest::post()
        .uri("/api/v1/threads")
        .insert_header(bearer(&author))
        .set_json(json!({"title": "Draft", "content": "wip", "channel_id": channel_id, "publish": false}))
        .to_request();
    let thread_id = body_json(test::call_service(&app, req).await).await["id"].as_i64().unwrap();

    let req = test::TestRequest::get().uri(&format!("/api/v1/threads?channel_id={channel_id}")).to_request();
    assert!(body_json(test::call_service(&app, req).await).await.as_array().unwrap().is_empty());

    let uri = format!("/api/v1/threads/{thread_id}");
    let req = test::TestRequest::get().uri(&uri).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
    let req = test::TestRequest::get().uri(&uri).insert_header(bearer(&other)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
    let req = test::TestRequest::get().uri(&uri).insert_header(bearer(&author)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);

    // answers of a draft are hidden the same way
    let answers_uri = format!("/api/v1/threads/{thread_id}/answers");
    let req = test::TestRequest::get().uri(&answers_uri).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
    let req = test::TestRequest::get().uri(&answers_uri).insert_header(bearer(&other)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
    let req = test::TestRequest::get().uri(&answers_uri).insert_header(bearer(&moderator)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);

    let req = test::TestRequest::post()
        .uri("/api/v1/answers")
        .insert_header(bearer(&other))
        .set_json(json!({"content": "sneaky", "thread_id": thread_id}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 422);
    assert_eq!(body_json(resp).await["errors"]["thread_id"][0], "The selected thread id is invalid.");
    assert!(repo.list_answers(thread_id).await.unwrap().is_empty());

    let req = test::TestRequest::post()
        .uri("/api/v1/answers")
        .insert_header(bearer(&author))
        .set_json(json!({"content": "note to self", "thread_id": thread_id}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 201);
    let req = test::TestRequest::get().uri(&answers_uri).insert_header(bearer(&author)).to_request();
    assert_eq!(body_json(test::call_service(&app, req).await).await.as_array().unwrap().len(), 1);

    // a stranger may not edit, a moderator may
    let req = test::TestRequest::put()
        .uri(&uri)
        .insert_header(bearer(&other))
        .set_json(json!({"publish": true}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);
    let req = test::TestRequest::put()
        .uri(&uri)
        .insert_header(bearer(&moderator))
        .set_json(json!({"publish": true, "title": "Final"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let updated = body_json(resp).await;
    assert_eq!(updated["slug"], "final");
    assert_eq!(updated["content"], "wip");

    let req = test::TestRequest::get().uri("/api/v1/threads").to_request();
    assert_eq!(body_json(test::call_service(&app, req).await).await.as_array().unwrap().len(), 1);

    let req = test::TestRequest::delete().uri(&uri).insert_header(bearer(&other)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);
    let req = test::TestRequest::delete().uri(&uri).insert_header(bearer(&moderator)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);
    let req = test::TestRequest::get().uri(&uri).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
}

#[actix_web::test]
#[serial]
async fn list_is_newest_first() {
    setup_env();
    let repo = seeded_repo().await;
    let a = channel(&repo, "a").await;
    let b = channel(&repo, "b").await;
    let (_, author) = user_with_roles(&repo, "author@example.com", &[USER]).await;
    let app = test::init_service(app(state(&repo))).await;

    for (title, channel_id) in [("one", a), ("two", b), ("three", a)] {
        let req = test::TestRequest::post()
            .uri("/api/v1/threads")
            .insert_header(bearer(&author))
            .set_json(json!({"title": title, "content": "c", "channel_id": channel_id}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 201);
    }

    let req = test::TestRequest::get().uri("/api/v1/threads").to_request();
    let all = body_json(test::call_service(&app, req).await).await;
    let titles: Vec<_> = all.as_array().unwrap().iter().map(|t| t["title"].as_str().unwrap().to_string()).collect();
    assert_eq!(titles, ["three", "two", "one"]);

    let req = test::TestRequest::get().uri(&format!("/api/v1/threads?channel_id={a}")).to_request();
    assert_eq!(body_json(test::call_service(&app, req).await).await.as_array().unwrap().len(), 2);
}
