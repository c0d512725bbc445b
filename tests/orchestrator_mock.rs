#![cfg(feature = "mock")]

use sqlrelay::{
    fixtures, AttemptFailure, Conversation, DatabaseSchemaProvider, Message, MessageRole,
    MockCompletionClient, MockDatabase, Model, PromptTemplates, StaticFewShot, TextToSql,
    TextToSqlOptions, TextToSqlOutcome, DEFAULT_FEW_SHOT_MODE,
};

#[tokio::test]
async fn exhausted_outcome_keeps_every_failure() {
    let completion = MockCompletionClient::new()
        .with_reply(fixtures::sql_reply("DROP TABLE games"))
        .with_reply("Sorry, I cannot help with that.")
        .with_reply(fixtures::sql_reply("SELECT scor FROM games"));
    let db = MockDatabase::new().with_error("column \"scor\" does not exist");

    let engine = TextToSql::builder(completion.clone(), db.clone())
        .schema_provider(fixtures::schema_provider())
        .build();

    let outcome = engine.answer("Remove the games", &["games"]).await.unwrap();
    let TextToSqlOutcome::Exhausted { attempts } = &outcome else {
        panic!("expected exhaustion, got {outcome:?}");
    };

    let kinds: Vec<_> = attempts.iter().map(|a| a.failure.kind()).collect();
    assert_eq!(kinds, vec!["not_read_only", "no_sql", "execution"]);
    assert_eq!(attempts.iter().map(|a| a.attempt).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert_eq!(db.queries(), vec!["SELECT scor FROM games"]);
    assert_eq!(outcome.into_parts(), (None, None));
}

#[tokio::test]
async fn options_drive_model_templates_and_budget() {
    let completion = MockCompletionClient::new()
        .with_fallback_reply(fixtures::sql_reply("UPDATE games SET home_score = 0"));
    let db = MockDatabase::new();

    let templates = PromptTemplates::default()
        .with_text_to_sql("Q: {natural_language_query}\nS: {schemas_str}")
        .with_error_correction("FIX: {error_message}");
    let engine = TextToSql::builder(completion.clone(), db)
        .schema_provider(fixtures::schema_provider())
        .options(
            TextToSqlOptions::default()
                .with_model("gpt-4o")
                .with_max_attempts(2)
                .with_templates(templates),
        )
        .build();
    assert_eq!(engine.options().model, Model::Gpt4o);

    let mut convo = Conversation::new();
    let outcome = engine
        .answer_in("zero all scores", &["teams"], &mut convo)
        .await
        .unwrap();

    assert!(!outcome.is_answered());
    assert_eq!(completion.call_count(), 2);
    assert_eq!(
        convo.messages()[0].content,
        "Q: zero all scores\nS: teams(id INTEGER, name TEXT, city TEXT)"
    );
    assert_eq!(
        convo.messages()[2].content,
        "FIX: Only read-only queries are allowed (found UPDATE)."
    );
    assert_eq!(convo.len(), 5);
}

#[tokio::test]
async fn introspected_schema_and_few_shot_seed_the_transcript() {
    let completion = MockCompletionClient::new().with_reply(fixtures::sql_reply("SELECT 1"));
    let db = MockDatabase::new()
        .with_table(fixtures::games_table())
        .with_result(fixtures::games_result_set());
    let few = StaticFewShot::new().with_messages(
        DEFAULT_FEW_SHOT_MODE,
        vec![
            Message::user("Count the games"),
            Message::assistant(fixtures::sql_reply("SELECT count(*) FROM games")),
        ],
    );

    let engine = TextToSql::builder(completion.clone(), db.clone())
        .schema_provider(DatabaseSchemaProvider::new(db))
        .few_shot(few)
        .build();
    let outcome = engine.answer("Home scores?", &["games"]).await.unwrap();
    assert!(outcome.is_answered());

    let sent = completion.transcripts().remove(0);
    let roles: Vec<_> = sent.messages().iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![MessageRole::User, MessageRole::Assistant, MessageRole::User]
    );
    assert!(sent.messages()[2]
        .content
        .contains("games(id INTEGER, home_team TEXT, home_score INTEGER)"));
}

#[tokio::test]
async fn follow_up_question_reuses_the_transcript() {
    let completion = MockCompletionClient::new()
        .with_reply(fixtures::sql_reply("SELECT home_team FROM games"))
        .with_reply(fixtures::sql_reply("SELECT home_score FROM games"));
    let db = MockDatabase::new()
        .with_result(fixtures::games_result_set())
        .with_result(fixtures::games_result_set());
    let engine = TextToSql::builder(completion.clone(), db)
        .schema_provider(fixtures::schema_provider())
        .build();

    let mut convo = engine.build_conversation("Teams?", &["games"]).await.unwrap();
    engine.answer_in("Teams?", &["games"], &mut convo).await.unwrap();
    assert_eq!(convo.len(), 1);

    convo.push(Message::assistant(fixtures::sql_reply("SELECT home_team FROM games")));
    convo.push(Message::user("Now the scores."));
    let (_, sql) = engine
        .answer_in("ignored", &["games"], &mut convo)
        .await
        .unwrap()
        .into_parts();
    assert_eq!(sql.as_deref(), Some("SELECT home_score FROM games"));
    assert_eq!(completion.transcripts()[1].len(), 3);
}

#[tokio::test]
async fn failure_records_keep_raw_reply_and_sql() {
    let reply = fixtures::sql_reply("SELECT scor FROM games");
    let completion = MockCompletionClient::new().with_fallback_reply(reply.clone());
    let db = MockDatabase::new();
    let engine = TextToSql::builder(completion, db)
        .schema_provider(fixtures::schema_provider())
        .max_attempts(1)
        .build();

    let outcome = engine.answer("q", &["games"]).await.unwrap();
    let record = &outcome.failures()[0];
    assert_eq!(record.reply, reply);
    assert_eq!(record.sql.as_deref(), Some("SELECT scor FROM games"));
    assert!(matches!(
        &record.failure,
        AttemptFailure::Execution(e) if e.message == "no mock result queued"
    ));
}
