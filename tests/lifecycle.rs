use serde_json::json;
use std::fs;
use std::path::Path;
use team_memo_lib::codec;
use team_memo_lib::models::{Content, MainStat, RelicSlot};
use team_memo_lib::{LoadSource, MemoConfig, SectionController, SectionView};
use tokio::time::{sleep, Duration};

fn temp_root() -> tempfile::TempDir {
    tempfile::tempdir().expect("temp data dir")
}

fn open(root: &Path) -> SectionController {
    SectionController::new(&MemoConfig::in_dir(root))
}

async fn settle() {
    sleep(Duration::from_millis(200)).await;
}

#[tokio::test(start_paused = true)]
async fn edits_survive_a_restart() {
    let root = temp_root();
    {
        let controller = open(root.path());
        assert_eq!(controller.startup(), LoadSource::Empty);
        controller.add_section(Some("Raid")).expect("add Raid");
        let row_id = controller
            .edit_section("Raid", |board| board.add_team_row())
            .expect("add team row");
        controller
            .edit_section("Raid", |board| {
                let character = board.character_mut(row_id, 0).expect("first slot");
                character.name = "Kafka".to_string();
                character.eidolon = 2;
            })
            .expect("edit Kafka");
        controller.close().expect("save on close");
    }

    let controller = open(root.path());
    assert_eq!(controller.startup(), LoadSource::Canonical);
    settle().await;

    let raid = controller.section_data("Raid").expect("Raid restored");
    assert_eq!(raid.teams.len(), 1);
    let kafka = &raid.teams[0].characters[0];
    assert_eq!(kafka.name, "Kafka");
    assert_eq!(kafka.eidolon, 2);
    assert_eq!(kafka.superimpose, 1);
    assert_eq!(kafka.level, 80);
    assert_eq!(kafka.main_stats.get(RelicSlot::Sphere), MainStat::HpPercent);
    assert_eq!(controller.visible_section().as_deref(), Some("Raid"));
}

#[tokio::test(start_paused = true)]
async fn legacy_pickle_is_migrated_on_startup() {
    let root = temp_root();
    let legacy = json!({
        "_last_section": "Boss",
        "_window_geometry": null,
        "Boss": {
            "content": "忘却の庭",
            "phase": null,
            "teams": [{
                "row_id": 4,
                "score": "30",
                "characters": [{"name": "Seele", "eidolon": 1, "main_stats": {"胴": "会心率"}}]
            }]
        }
    });
    let bytes = serde_pickle::to_vec(&legacy, serde_pickle::SerOptions::new()).expect("pickle fixture");
    fs::write(root.path().join("settings.pkl"), bytes).expect("write legacy file");

    let controller = open(root.path());
    assert_eq!(controller.startup(), LoadSource::LegacyBinary);
    assert!(root.path().join("settings.txt").exists());
    assert!(root.path().join("settings_backup.pkl").exists());
    assert!(!root.path().join("settings.pkl").exists());
    settle().await;

    let boss = controller.section_data("Boss").expect("Boss migrated");
    assert_eq!(boss.content, Some(Content::ForgottenHall));
    let seele = &boss.teams[0].characters[0];
    assert_eq!(seele.name, "Seele");
    assert_eq!(seele.main_stats.get(RelicSlot::Body), MainStat::CritRate);

    let next = controller
        .edit_section("Boss", |board| board.add_team_row())
        .expect("add row");
    assert_eq!(next, 5);
}

#[tokio::test(start_paused = true)]
async fn field_edit_burst_is_written_once() {
    let root = temp_root();
    let controller = open(root.path());
    controller.startup();
    settle().await;
    let section = controller.visible_section().expect("default section");
    let row_id = controller
        .with_view(&section, |board| board.rows()[0].row_id)
        .expect("default row");

    for level in 70..80u8 {
        controller
            .edit_section(&section, |board| board.character_mut(row_id, 1).expect("slot").level = level)
            .expect("edit level");
        sleep(Duration::from_millis(100)).await;
    }
    sleep(Duration::from_millis(600)).await;

    assert_eq!(controller.scheduler().completed_saves(), 1);
    let saved = codec::decode(&fs::read_to_string(root.path().join("settings.txt")).expect("saved"))
        .expect("decode saved");
    assert_eq!(saved.sections[&section].teams[0].characters[1].level, 79);
}

#[tokio::test(start_paused = true)]
async fn failed_write_keeps_memory_state_and_next_save_retries() {
    let root = temp_root();
    let controller = open(root.path());
    controller.startup();
    settle().await;

    let blocker = root.path().join("settings.txt");
    fs::create_dir(&blocker).expect("block canonical path");
    assert!(controller.select_content("セクション 1", Content::PureFiction));
    assert_eq!(controller.scheduler().failed_saves(), 1);
    assert_eq!(
        controller.section_data("セクション 1").expect("section").content,
        Some(Content::PureFiction)
    );

    fs::remove_dir(&blocker).expect("unblock canonical path");
    controller.close().expect("retry succeeds");
    let saved = codec::decode(&fs::read_to_string(&blocker).expect("saved")).expect("decode saved");
    assert_eq!(saved.sections["セクション 1"].content, Some(Content::PureFiction));
}
