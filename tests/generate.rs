use std::fs;
use std::path::Path;

use sqlgraft::codegen::{ArtifactStatus, GenerationReport};
use sqlgraft::prelude::*;

const SCHEMA: &str = r#"{
    "tables": [
        {"name": "authors", "columns": [
            {"name": "id", "type": {"name": "bigint"}},
            {"name": "name", "type": {"name": "text"}},
            {"name": "bio", "type": {"name": "text", "is_nullable": true}},
            {"name": "created_at", "type": {"name": "timestamptz"}}
        ]},
        {"name": "posts", "columns": [
            {"name": "id", "type": {"name": "bigint"}},
            {"name": "author_id", "type": {"name": "bigint"}},
            {"name": "mood", "type": {"name": "mood", "is_nullable": true}},
            {"name": "tags", "type": {"name": "text", "is_array": true}}
        ]},
        {"name": "schema_migrations", "columns": [
            {"name": "version", "type": {"name": "bigint"}}
        ]}
    ],
    "enums": [{"name": "mood", "values": ["happy", "sad"]}],
    "composites": [{"name": "address", "columns": [
        {"name": "street", "type": {"name": "text"}},
        {"name": "zip", "type": {"name": "varchar(10)"}}
    ]}],
    "queries": [
        {
            "name": "GetAuthor",
            "shape": "row",
            "parameters": [{"name": "id", "type": {"name": "bigint"}, "position": 1}],
            "columns": [
                {"name": "created_at", "type": {"name": "timestamptz"}},
                {"name": "bio", "type": {"name": "text", "is_nullable": true}},
                {"name": "name", "type": {"name": "text"}},
                {"name": "id", "type": {"name": "bigint"}}
            ],
            "sql": "SELECT created_at, bio, name, id FROM authors WHERE id = $1"
        },
        {
            "name": "ListAuthorsWithPosts",
            "shape": "rows",
            "columns": [
                {"name": "id", "type": {"name": "bigint"}},
                {"name": "posts", "type": {"name": "json"}, "is_json_aggregate": true, "json_element_table": "posts"}
            ],
            "sql": "SELECT a.id, json_agg(p) AS posts FROM authors a JOIN posts p ON p.author_id = a.id GROUP BY a.id"
        },
        {
            "name": "DeletePost",
            "shape": "exec_rows",
            "parameters": [{"name": "id", "type": {"name": "bigint"}, "position": 1}],
            "sql": "DELETE FROM posts WHERE id = $1"
        }
    ]
}"#;

fn load_schema() -> Schema {
    let mut schema = Schema::from_json_str(SCHEMA).unwrap();
    schema.apply_filter(&TableFilter::default().with_bookkeeping_table("schema_migrations"));
    schema
}

fn generate(schema: &Schema, config: &CodeGenConfig) -> GenerationReport {
    let registry = GeneratorRegistry::with_builtin();
    registry
        .lookup("go")
        .unwrap()
        .generate(schema, config)
        .unwrap()
}

fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap()
}

#[test]
fn test_first_run_creates_every_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let config = CodeGenConfig::new(dir.path().to_path_buf())
        .with_models_import("example.com/app/db/models");

    let report = generate(&load_schema(), &config);

    // 2 tables, 1 enum, 1 composite, querier, 3 queries
    assert_eq!(report.summary().created, 8);
    assert!(!report.is_failure());
    assert!(!config.models_dir().join("schema_migrations.go").exists());

    let authors = read(&config.models_dir().join("authors.go"));
    assert!(authors.contains("type AuthorsExtension struct {\n}"));
    assert!(authors.contains("\tBio       *string\n"));
    assert!(authors.contains("\tCreatedAt time.Time\n\tAuthorsExtension\n}"));

    let posts = read(&config.models_dir().join("posts.go"));
    assert!(posts.contains("\tMood     *Mood\n"));
    assert!(posts.contains("\tTags     []string\n"));
    assert!(!posts.contains("import"));

    let mood = read(&config.models_dir().join("mood.go"));
    assert!(mood.contains("\tMoodHappy Mood = \"happy\"\n"));

    let get_author = read(&config.queries_dir().join("get_author.go"));
    assert!(get_author.contains("\t\"example.com/app/db/models\"\n"));
    assert!(get_author.contains(") (models.Authors, error) {"));
    assert!(get_author.contains("row.Scan(&i.CreatedAt, &i.Bio, &i.Name, &i.Id)"));
    assert!(!get_author.contains("GetAuthorRow"));

    let list = read(&config.queries_dir().join("list_authors_with_posts.go"));
    assert!(list.contains("type ListAuthorsWithPostsRow struct {"));
    assert!(list.contains("\tPosts []models.Posts\n"));

    assert!(config.queries_dir().join("querier.go").exists());
}

#[test]
fn test_second_run_is_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let config = CodeGenConfig::new(dir.path().to_path_buf());
    let schema = load_schema();

    generate(&schema, &config);
    let before = read(&config.models_dir().join("authors.go"));
    let report = generate(&schema, &config);

    assert_eq!(report.summary().unchanged, report.outcomes.len());
    assert_eq!(read(&config.models_dir().join("authors.go")), before);

    let check = generate(&schema, &config.clone().with_write_mode(WriteMode::Check));
    assert!(!check.is_failure());
}

#[test]
fn test_regeneration_keeps_hand_written_code() {
    let dir = tempfile::tempdir().unwrap();
    let config = CodeGenConfig::new(dir.path().to_path_buf());
    let mut schema = load_schema();
    generate(&schema, &config);

    let path = config.models_dir().join("authors.go");
    let edited = read(&path)
        .replace(
            "type AuthorsExtension struct {\n}",
            "type AuthorsExtension struct {\n\tBio []string `json:\"bio\"`\n}",
        )
        + "\n// Initials is hand-written.\nfunc (a Authors) Initials() string {\n\treturn a.Name[:1]\n}\n";
    fs::write(&path, edited).unwrap();

    // Column dropped from the schema: the temporal import must go too
    schema.tables[0].columns.retain(|c| c.name != "created_at");
    let report = generate(&schema, &config);

    let status = report
        .outcomes
        .iter()
        .find(|o| o.unit == "table authors")
        .map(|o| o.result.as_ref().ok().copied());
    assert_eq!(status, Some(Some(ArtifactStatus::Updated)));

    let authors = read(&path);
    assert!(authors.contains("\tBio []string `json:\"bio\"`\n"));
    assert!(!authors.contains("*string"));
    assert!(!authors.contains("CreatedAt"));
    assert!(!authors.contains("\"time\""));
    assert!(authors.contains("func (a Authors) Initials() string {\n\treturn a.Name[:1]\n}"));

    // The merged file is a fixed point
    let again = generate(&schema, &config);
    assert!(again
        .outcomes
        .iter()
        .all(|o| matches!(o.result, Ok(ArtifactStatus::Unchanged))));
}

#[test]
fn test_enum_gains_value_and_keeps_methods() {
    let dir = tempfile::tempdir().unwrap();
    let config = CodeGenConfig::new(dir.path().to_path_buf());
    let mut schema = load_schema();
    generate(&schema, &config);

    let path = config.models_dir().join("mood.go");
    let edited = read(&path) + "\nfunc (m Mood) Valid() bool {\n\treturn m == MoodHappy || m == MoodSad\n}\n";
    fs::write(&path, edited).unwrap();

    schema.enums[0].values.push("meh".into());
    generate(&schema, &config);

    let mood = read(&path);
    assert!(mood.contains("\tMoodMeh   Mood = \"meh\"\n"));
    assert!(mood.contains("func (m Mood) Valid() bool {"));
}

#[test]
fn test_unparsable_artifact_is_reported_and_left_alone() {
    let dir = tempfile::tempdir().unwrap();
    let config = CodeGenConfig::new(dir.path().to_path_buf());
    fs::create_dir_all(config.models_dir()).unwrap();
    let path = config.models_dir().join("posts.go");
    fs::write(&path, "package models\n\nfunc (\n").unwrap();

    let report = generate(&load_schema(), &config);

    assert_eq!(report.summary().failed, 1);
    assert!(report.is_failure());
    assert_eq!(read(&path), "package models\n\nfunc (\n");
    assert!(config.models_dir().join("authors.go").exists());
}
