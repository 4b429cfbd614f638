// File: emberbot-core/tests/repository_tests.rs

use emberbot_core::Database;
use emberbot_core::Error;
use emberbot_core::models::CustomCommand;
use emberbot_core::repositories::{CommandRepository, SqliteCommandRepository};

async fn open_repo(dir: &tempfile::TempDir) -> Result<SqliteCommandRepository, Error> {
    let db_path = dir.path().join("emberbot.db");
    let db = Database::new(db_path.to_str().expect("utf-8 temp path")).await?;
    db.migrate().await?;
    Ok(SqliteCommandRepository::new(db.pool().clone()))
}

#[tokio::test]
async fn upsert_get_delete_round_trip() -> Result<(), Error> {
    let dir = tempfile::tempdir()?;
    let repo = open_repo(&dir).await?;

    let cmd = CustomCommand::new("Kappa", "Golden Kappa check", false);
    repo.upsert_command(&cmd).await?;

    // The lookup key is case-insensitive; the stored name is normalized.
    let fetched = repo.get_command_by_name("KAPPA").await?.expect("stored");
    assert_eq!(fetched.command_id, cmd.command_id);
    assert_eq!(fetched.command_name, "kappa");
    assert_eq!(fetched.content, "Golden Kappa check");
    assert!(!fetched.is_mod_only);

    assert!(repo.delete_command("Kappa").await?);
    assert!(!repo.delete_command("Kappa").await?);
    assert!(repo.get_command_by_name("kappa").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn upsert_overwrites_on_name_conflict() -> Result<(), Error> {
    let dir = tempfile::tempdir()?;
    let repo = open_repo(&dir).await?;

    repo.upsert_command(&CustomCommand::new("kappa", "first version", false))
        .await?;
    repo.upsert_command(&CustomCommand::new("kappa", "MixedCase Content", true))
        .await?;

    let commands = repo.list_commands().await?;
    assert_eq!(commands.len(), 1);
    // Content keeps its casing exactly.
    assert_eq!(commands[0].content, "MixedCase Content");
    assert!(commands[0].is_mod_only);
    Ok(())
}

#[tokio::test]
async fn list_is_ordered_by_name() -> Result<(), Error> {
    let dir = tempfile::tempdir()?;
    let repo = open_repo(&dir).await?;

    for (name, content) in [("lurk", "is lurking"), ("discord", "join us"), ("kappa", "check")] {
        repo.upsert_command(&CustomCommand::new(name, content, false))
            .await?;
    }

    let names: Vec<String> = repo
        .list_commands()
        .await?
        .into_iter()
        .map(|c| c.command_name)
        .collect();
    assert_eq!(names, vec!["discord", "kappa", "lurk"]);
    Ok(())
}
