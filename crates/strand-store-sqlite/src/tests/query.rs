use serde_json::json;
use strand_core::{
  ErrorKind,
  operation::{
    CompareOp, CreateInput, Filter, Page, Quantifier, Query, RelationOp, RelationQuery, Selection,
    Sort,
  },
  store::GraphStore as _,
};

use super::{create, engine, query};

fn post(title: &str, poster: &str) -> CreateInput {
  CreateInput::new()
    .set("title", title)
    .relate("Poster", RelationOp::connect(Filter::eq("username", poster)))
}

fn texts(result: &strand_core::record::QueryResult, key: &str) -> Vec<String> {
  result
    .records
    .iter()
    .map(|r| r.scalar(key).and_then(|v| v.as_str()).unwrap_or_default().to_owned())
    .collect()
}

// ─── Shape ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn tag_post_user_scenario() {
  let engine = engine().await;

  create(&engine, "Tag", CreateInput::new().set("text", "news")).await;
  create(
    &engine,
    "Post",
    CreateInput::new()
      .set("title", "Launch")
      .relate("Tags", RelationOp::connect(Filter::eq("text", "news")))
      .relate("Poster", RelationOp::Create(CreateInput::new().set("username", "alice"))),
  )
  .await;

  let result = query(
    &engine,
    Query::new("Post").filter(Filter::eq("title", "Launch")).select(
      Selection::fields(["title"])
        .relation(RelationQuery::new("Tags", Selection::fields(["text"])))
        .relation(RelationQuery::new("Poster", Selection::fields(["username"]))),
    ),
  )
  .await;

  assert_eq!(
    result.to_json(),
    json!([{
      "title": "Launch",
      "Tags": [{ "text": "news" }],
      "Poster": { "username": "alice" },
    }])
  );
  assert_eq!(result.total_count, 1);
}

#[tokio::test]
async fn only_requested_keys_are_returned() {
  let engine = engine().await;
  create(&engine, "User", CreateInput::new().set("username", "alice")).await;
  create(&engine, "Post", post("Launch", "alice").set("description", "first")).await;

  let result = query(&engine, Query::new("Post").select(Selection::fields(["title"]))).await;
  let keys: Vec<_> = result.records[0].keys().collect();
  assert_eq!(keys, ["title"]);

  // Absent optional scalars come back as null.
  let result = query(&engine, Query::new("User").select(Selection::fields(["deleted"]))).await;
  assert_eq!(result.to_json(), json!([{ "deleted": null }]));
}

#[tokio::test]
async fn unconnected_relationships_are_null_or_empty() {
  let engine = engine().await;
  create(&engine, "Comment", CreateInput::new().set("text", "hi").set("isRootComment", true)).await;

  let result = query(
    &engine,
    Query::new("Comment").select(
      Selection::fields(["text"])
        .relation(RelationQuery::new("ParentComment", Selection::fields(["text"])))
        .relation(RelationQuery::new("Tags", Selection::fields(["text"]))),
    ),
  )
  .await;

  assert_eq!(result.to_json(), json!([{ "text": "hi", "ParentComment": null, "Tags": [] }]));
}

#[tokio::test]
async fn self_reference_stops_at_requested_depth() {
  let engine = engine().await;
  create(&engine, "Comment", CreateInput::new().set("text", "c0").set("isRootComment", true)).await;
  for i in 1..=4 {
    let parent = format!("c{}", i - 1);
    create(
      &engine,
      "Comment",
      CreateInput::new()
        .set("text", format!("c{i}"))
        .set("isRootComment", false)
        .relate("ParentComment", RelationOp::connect(Filter::eq("text", parent))),
    )
    .await;
  }

  let two_levels = Selection::fields(["text"]).relation(RelationQuery::new(
    "ParentComment",
    Selection::fields(["text"])
      .relation(RelationQuery::new("ParentComment", Selection::fields(["text"]))),
  ));
  let result = query(
    &engine,
    Query::new("Comment").filter(Filter::eq("text", "c4")).select(two_levels),
  )
  .await;

  assert_eq!(
    result.to_json(),
    json!([{ "text": "c4", "ParentComment": { "text": "c3", "ParentComment": { "text": "c2" } } }])
  );

  // The same edge read from the other side.
  let result = query(
    &engine,
    Query::new("Comment").filter(Filter::eq("text", "c0")).select(
      Selection::fields(["text"])
        .relation(RelationQuery::new("ChildComments", Selection::fields(["text"]))),
    ),
  )
  .await;
  assert_eq!(result.to_json(), json!([{ "text": "c0", "ChildComments": [{ "text": "c1" }] }]));
}

// ─── Filters ─────────────────────────────────────────────────────────────────

async fn seeded() -> strand_core::Engine<crate::SqliteStore> {
  let engine = engine().await;
  create(&engine, "User", CreateInput::new().set("username", "alice")).await;
  create(&engine, "Tag", CreateInput::new().set("text", "news")).await;
  create(&engine, "Tag", CreateInput::new().set("text", "misc")).await;

  let tagged = |title: &str, tags: &[&str]| {
    tags.iter().fold(post(title, "alice"), |input, tag| {
      input.relate("Tags", RelationOp::connect(Filter::eq("text", *tag)))
    })
  };
  create(&engine, "Post", tagged("Launch day", &["news"])).await;
  create(&engine, "Post", tagged("Release notes", &["news", "misc"])).await;
  create(&engine, "Post", tagged("Lunch", &[])).await;
  engine
}

#[tokio::test]
async fn scalar_filters() {
  let engine = seeded().await;
  let titles = |filter: Filter| {
    let engine = engine.clone();
    async move {
      let q = Query::new("Post").filter(filter).select(Selection::fields(["title"]));
      texts(&query(&engine, q).await, "title")
    }
  };

  assert_eq!(titles(Filter::compare("title", CompareOp::StartsWith, "L")).await, [
    "Launch day",
    "Lunch"
  ]);
  assert_eq!(titles(Filter::compare("title", CompareOp::Contains, "notes")).await, [
    "Release notes"
  ]);
  assert_eq!(titles(Filter::compare("title", CompareOp::Matches, "L.n.*")).await, ["Lunch"]);
  assert_eq!(
    titles(Filter::In {
      field:  "title".into(),
      values: vec!["Lunch".into(), "Release notes".into()],
    })
    .await,
    ["Release notes", "Lunch"]
  );
  assert_eq!(titles(Filter::eq("title", "Lunch").not()).await, ["Launch day", "Release notes"]);
  assert_eq!(titles(Filter::is_null("description")).await.len(), 3);
  assert_eq!(
    titles(Filter::compare("createdAt", CompareOp::Gt, "2000-01-01T00:00:00Z")).await.len(),
    3
  );
}

#[tokio::test]
async fn relation_existence_filters_roots() {
  let engine = seeded().await;
  let titles = |quantifier: Quantifier, inner: Option<Filter>| {
    let engine = engine.clone();
    async move {
      let q = Query::new("Post")
        .filter(Filter::relation("Tags", quantifier, inner))
        .select(Selection::fields(["title"]));
      texts(&query(&engine, q).await, "title")
    }
  };

  let news = || Some(Filter::eq("text", "news"));
  assert_eq!(titles(Quantifier::Some, news()).await, ["Launch day", "Release notes"]);
  assert_eq!(titles(Quantifier::None, news()).await, ["Lunch"]);
  assert_eq!(titles(Quantifier::All, news()).await, ["Launch day", "Lunch"]);
  assert_eq!(titles(Quantifier::Single, None).await, ["Launch day"]);
}

#[tokio::test]
async fn nested_filter_restricts_related_not_roots() {
  let engine = seeded().await;
  let result = query(
    &engine,
    Query::new("Post").select(Selection::fields(["title"]).relation(
      RelationQuery::new("Tags", Selection::fields(["text"])).filter(Filter::eq("text", "misc")),
    )),
  )
  .await;

  assert_eq!(
    result.to_json(),
    json!([
      { "title": "Launch day", "Tags": [] },
      { "title": "Release notes", "Tags": [{ "text": "misc" }] },
      { "title": "Lunch", "Tags": [] },
    ])
  );
}

// ─── Sorting and pagination ──────────────────────────────────────────────────

#[tokio::test]
async fn cursor_pagination_walks_sorted_results() {
  let engine = engine().await;
  for text in ["b", "e", "a", "d", "c"] {
    create(&engine, "Tag", CreateInput::new().set("text", text)).await;
  }
  let page = |page: Page| {
    Query::new("Tag").sort(Sort::desc("text")).page(page).select(Selection::fields(["text"]))
  };

  let first = query(&engine, page(Page::limit(2))).await;
  assert_eq!(texts(&first, "text"), ["e", "d"]);
  assert_eq!(first.total_count, 5);
  assert!(first.page_info.has_next_page);

  let cursor = first.page_info.end_cursor.clone().unwrap();
  let second = query(&engine, page(Page::after(cursor, 2))).await;
  assert_eq!(texts(&second, "text"), ["c", "b"]);

  let cursor = second.page_info.end_cursor.clone().unwrap();
  let last = query(&engine, page(Page::after(cursor, 2))).await;
  assert_eq!(texts(&last, "text"), ["a"]);
  assert!(!last.page_info.has_next_page);

  let offset = query(&engine, page(Page::offset(4, 10))).await;
  assert_eq!(texts(&offset, "text"), ["a"]);
  let beyond = query(&engine, page(Page::offset(9, 10))).await;
  assert!(beyond.records.is_empty());
  assert_eq!(beyond.page_info.end_cursor, None);
}

#[tokio::test]
async fn out_of_range_cursor_is_rejected_and_store_survives() {
  let engine = engine().await;
  create(&engine, "Tag", CreateInput::new().set("text", "news")).await;

  let last = strand_core::cursor::encode(usize::MAX);
  let err = engine.query(&Query::new("Tag").page(Page::after(last, 5))).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Validation);

  assert_eq!(query(&engine, Query::new("Tag")).await.total_count, 1);
}

#[tokio::test]
async fn ties_keep_creation_order() {
  let engine = engine().await;
  create(&engine, "User", CreateInput::new().set("username", "alice")).await;
  for title in ["same", "other", "same"] {
    create(&engine, "Post", post(title, "alice").set("description", title)).await;
  }

  let result = query(
    &engine,
    Query::new("Post")
      .sort(Sort::asc("title"))
      .select(Selection::fields(["title", "createdAt"])),
  )
  .await;
  assert_eq!(texts(&result, "title"), ["other", "same", "same"]);

  let stamps: Vec<_> = result.records[1..].iter().map(|r| r.scalar("createdAt").cloned()).collect();
  assert!(stamps[0].as_ref().unwrap().compare(stamps[1].as_ref().unwrap()).is_le());
}

#[tokio::test]
async fn nested_pagination_is_per_parent() {
  let engine = engine().await;
  for user in ["alice", "bob"] {
    create(&engine, "User", CreateInput::new().set("username", user)).await;
    for n in 1..=3 {
      create(&engine, "Post", post(&format!("{user}-{n}"), user)).await;
    }
  }

  let result = query(
    &engine,
    Query::new("User").select(
      Selection::fields(["username"]).relation(
        RelationQuery::new("Posts", Selection::fields(["title"]))
          .sort(Sort::desc("title"))
          .page(Page::limit(2)),
      ),
    ),
  )
  .await;

  assert_eq!(
    result.to_json(),
    json!([
      { "username": "alice", "Posts": [{ "title": "alice-3" }, { "title": "alice-2" }] },
      { "username": "bob", "Posts": [{ "title": "bob-3" }, { "title": "bob-2" }] },
    ])
  );
}

// ─── Validation ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn invalid_queries_fail_before_store_access() {
  let engine = engine().await;
  engine.store().clone().close().await.unwrap();

  let bad = [
    Query::new("Post").select(Selection::fields(["nope"])),
    Query::new("Nope"),
    Query::new("Post").filter(Filter::eq("Tags", "x")),
    Query::new("Post").select(
      Selection::default().relation(RelationQuery::new("Unknown", Selection::default())),
    ),
    Query::new("Post").page(Page::after("not a cursor", 1)),
  ];
  for q in bad {
    assert_eq!(engine.query(&q).await.unwrap_err().kind(), ErrorKind::Validation);
  }

  // A valid query does reach the (closed) store.
  let err = engine.query(&Query::new("Post")).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Store);
  assert!(err.is_retryable());
}
