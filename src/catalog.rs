//! LaunchBox XML catalog ingestion.
//!
//! A catalog is a `<LaunchBox>` document whose `<Game>` children become
//! records and whose `<AlternateName>` children enrich the searchable text.
//! Incomplete games are skipped, never fatal; anything wrong with the
//! document itself is.

use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::Path,
};

use anyhow::{bail, Context, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Deserialize;
use tracing::warn;

use crate::engine::{tokenize, Record};

#[derive(Debug, Deserialize)]
struct CatalogDoc {
    #[serde(rename = "Game", default)]
    games: Vec<GameNode>,
    #[serde(rename = "AlternateName", default)]
    alternate_names: Vec<AlternateNameNode>,
}

#[derive(Debug, Deserialize)]
struct GameNode {
    #[serde(rename = "ID")]
    id: Option<String>,
    #[serde(rename = "Title")]
    title: Option<String>,
    #[serde(rename = "RootFolder")]
    root_folder: Option<String>,
    #[serde(rename = "ReleaseDate")]
    release_date: Option<String>,
    #[serde(rename = "Developer")]
    developer: Option<String>,
    #[serde(rename = "Publisher")]
    publisher: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AlternateNameNode {
    #[serde(rename = "GameId")]
    game_id: Option<String>,
    #[serde(rename = "Name")]
    name: Option<String>,
}

/// Reads a LaunchBox XML catalog into searchable records.
pub fn load(path: &Path) -> Result<Vec<Record>> {
    let xml = fs::read_to_string(path)
        .with_context(|| format!("cannot open catalog {}", path.display()))?;
    parse(&xml).with_context(|| format!("cannot parse catalog {}", path.display()))
}

/// Parses catalog XML. A document that yields zero records is not an error.
pub fn parse(xml: &str) -> Result<Vec<Record>> {
    ensure_launchbox_root(xml)?;
    let doc: CatalogDoc =
        quick_xml::de::from_str(xml).context("malformed catalog document")?;

    let mut alternates: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for alt in &doc.alternate_names {
        if let (Some(game_id), Some(name)) = (nonempty(&alt.game_id), nonempty(&alt.name)) {
            alternates.entry(game_id).or_default().insert(name);
        }
    }

    let mut records = Vec::with_capacity(doc.games.len());
    for game in &doc.games {
        let Some(key) = nonempty(&game.root_folder) else {
            warn!(
                title = game.title.as_deref().unwrap_or_default(),
                "skipping game without root folder"
            );
            continue;
        };
        let Some(title) = nonempty(&game.title) else {
            warn!(key, "skipping game without title");
            continue;
        };

        let mut content = title.to_string();

        if let Some(id) = nonempty(&game.id) {
            if let Some(names) = alternates.get(id) {
                for name in names {
                    content.push(' ');
                    content.push_str(name);
                }
            }
        }

        if let Some(date) = nonempty(&game.release_date) {
            if let Some(year) = date.get(..4) {
                if !content.contains(year) {
                    content.push(' ');
                    content.push_str(year);
                }
            }
        }

        let developer = nonempty(&game.developer);
        if let Some(dev) = developer {
            content.push(' ');
            content.push_str(dev);
        }
        if let Some(publisher) = nonempty(&game.publisher) {
            if developer != Some(publisher) {
                content.push(' ');
                content.push_str(publisher);
            }
        }

        let words = tokenize(&content);
        records.push(Record {
            key: key.to_string(),
            content,
            words,
        });
    }
    Ok(records)
}

/// The serde pass ignores the root element's name, so check it up front.
fn ensure_launchbox_root(xml: &str) -> Result<()> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event().context("malformed catalog document")? {
            Event::Start(start) | Event::Empty(start) => {
                if start.name().as_ref() == b"LaunchBox" {
                    return Ok(());
                }
                bail!(
                    "unexpected root element <{}>, expected <LaunchBox>",
                    String::from_utf8_lossy(start.name().as_ref())
                );
            }
            Event::Eof => bail!("no LaunchBox root element found"),
            _ => {}
        }
    }
}

fn nonempty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DOOM_CATALOG: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<LaunchBox>
  <Game>
    <ID>g-1</ID>
    <Title>DOOM</Title>
    <RootFolder>DOOM</RootFolder>
    <ReleaseDate>1993-12-10T00:00:00-05:00</ReleaseDate>
    <Developer>id Software</Developer>
    <Publisher>id Software</Publisher>
  </Game>
  <Game>
    <ID>g-2</ID>
    <Title>DOOM II</Title>
    <RootFolder>DOOM II</RootFolder>
    <ReleaseDate>1994-10-10T00:00:00-04:00</ReleaseDate>
    <Developer>id Software</Developer>
    <Publisher>GT Interactive</Publisher>
  </Game>
  <AlternateName>
    <GameId>g-2</GameId>
    <Name>Hell on Earth</Name>
  </AlternateName>
</LaunchBox>"#;

    #[test]
    fn parses_games_with_alternate_names() {
        let records = parse(DOOM_CATALOG).unwrap();
        assert_eq!(records.len(), 2);

        assert_eq!(records[0].key, "DOOM");
        assert_eq!(records[0].content, "DOOM 1993 id Software");

        assert_eq!(records[1].key, "DOOM II");
        assert_eq!(
            records[1].content,
            "DOOM II Hell on Earth 1994 id Software GT Interactive"
        );
        assert!(records[1].words.contains(&"hell".to_string()));
    }

    #[test]
    fn publisher_matching_developer_appears_once() {
        let records = parse(DOOM_CATALOG).unwrap();
        assert_eq!(records[0].content.matches("id Software").count(), 1);
    }

    #[test]
    fn year_already_in_title_is_not_repeated() {
        let xml = r#"<LaunchBox>
  <Game>
    <Title>Heretic 1994</Title>
    <RootFolder>Heretic</RootFolder>
    <ReleaseDate>1994-12-23T00:00:00-05:00</ReleaseDate>
  </Game>
</LaunchBox>"#;
        let records = parse(xml).unwrap();
        assert_eq!(records[0].content, "Heretic 1994");
    }

    #[test]
    fn alternate_names_are_sorted_and_deduplicated() {
        let xml = r#"<LaunchBox>
  <Game>
    <ID>x</ID>
    <Title>Quake</Title>
    <RootFolder>Quake</RootFolder>
  </Game>
  <AlternateName><GameId>x</GameId><Name>Zeta</Name></AlternateName>
  <AlternateName><GameId>x</GameId><Name>Alpha</Name></AlternateName>
  <AlternateName><GameId>x</GameId><Name>Alpha</Name></AlternateName>
  <AlternateName><GameId>y</GameId><Name>Unrelated</Name></AlternateName>
</LaunchBox>"#;
        let records = parse(xml).unwrap();
        assert_eq!(records[0].content, "Quake Alpha Zeta");
    }

    #[test]
    fn incomplete_games_are_skipped() {
        let xml = r#"<LaunchBox>
  <Game><Title>No Folder</Title></Game>
  <Game><RootFolder>No Title</RootFolder></Game>
  <Game><Title></Title><RootFolder>Empty Title</RootFolder></Game>
  <Game><Title>Kept</Title><RootFolder>Kept</RootFolder></Game>
</LaunchBox>"#;
        let records = parse(xml).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key, "Kept");
    }

    #[test]
    fn short_release_date_is_ignored() {
        let xml = r#"<LaunchBox>
  <Game>
    <Title>Blake Stone</Title>
    <RootFolder>Blake Stone</RootFolder>
    <ReleaseDate>93</ReleaseDate>
  </Game>
</LaunchBox>"#;
        let records = parse(xml).unwrap();
        assert_eq!(records[0].content, "Blake Stone");
    }

    #[test]
    fn empty_catalog_is_not_an_error() {
        let records = parse("<LaunchBox></LaunchBox>").unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn wrong_root_element_is_rejected() {
        let err = parse("<GameList><Game/></GameList>").unwrap_err();
        assert!(err.to_string().contains("LaunchBox"));
    }

    #[test]
    fn truncated_document_is_rejected() {
        assert!(parse("<LaunchBox><Game><Title>half").is_err());
        assert!(parse("").is_err());
    }

    #[test]
    fn load_reads_a_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.xml");
        fs::write(&path, DOOM_CATALOG).unwrap();

        let records = load(&path).unwrap();
        assert_eq!(records.len(), 2);

        let missing = load(&dir.path().join("absent.xml"));
        assert!(missing.is_err());
    }
}
