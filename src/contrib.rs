//! Contributors - prompt loop producing contributor lines, and their parser
//!
//! Line format (one output value per contributor):
//!
//! ```text
//! Director: Lana Wachowski | https://example.org/artist.php?id=12
//! Actor: Keanu Reeves | Neo | https://example.org/artist.php?id=34
//! ```
//!
//! Parsing is strict: a line lacking the role tag, the name or the URL is
//! rejected with `UnexpectedLine`.

use std::fmt;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::collab::{resolve_entity, MetadataClient};
use crate::error::{ConvoyError, Result};
use crate::job::{JobContext, Worker};
use crate::prompt::{ChoiceOption, Prompt};

static LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<role>\w+): (?P<name>[^|]+?) \| (?:(?P<character>[^|]*?) \| )?(?P<url>\S+://\S+)$")
        .expect("contributor line regex is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContributorRole {
    Actor,
    Director,
    Writer,
    Producer,
    Composer,
    Cinematographer,
}

impl ContributorRole {
    /// Prompt order
    pub const ALL: [Self; 6] = [
        Self::Actor,
        Self::Director,
        Self::Writer,
        Self::Producer,
        Self::Composer,
        Self::Cinematographer,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            Self::Actor => "Actor",
            Self::Director => "Director",
            Self::Writer => "Writer",
            Self::Producer => "Producer",
            Self::Composer => "Composer",
            Self::Cinematographer => "Cinematographer",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.tag() == tag)
    }

    /// Numeric importance expected by the destination
    pub fn importance(self) -> u8 {
        match self {
            Self::Director => 1,
            Self::Writer => 2,
            Self::Producer => 3,
            Self::Composer => 4,
            Self::Actor => 5,
            Self::Cinematographer => 6,
        }
    }

    /// Actors are asked for the character they play
    pub fn has_character(self) -> bool {
        matches!(self, Self::Actor)
    }
}

impl fmt::Display for ContributorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contributor {
    pub role: ContributorRole,
    pub name: String,
    pub character: Option<String>,
    pub url: String,
}

impl Contributor {
    pub fn parse(line: &str) -> Result<Self> {
        let unexpected = || ConvoyError::UnexpectedLine {
            line: line.to_string(),
        };
        let caps = LINE.captures(line.trim()).ok_or_else(unexpected)?;
        let role = ContributorRole::from_tag(&caps["role"]).ok_or_else(unexpected)?;
        let character = caps
            .name("character")
            .map(|m| m.as_str().trim().to_string())
            .filter(|c| !c.is_empty());

        Ok(Self {
            role,
            name: caps["name"].trim().to_string(),
            character,
            url: caps["url"].to_string(),
        })
    }

    /// Id of the contributor at the destination: the URL's `id` query
    /// parameter, else its last path segment, else the URL itself
    pub fn external_id(&self) -> String {
        let Ok(url) = Url::parse(&self.url) else {
            return self.url.clone();
        };
        if let Some((_, id)) = url.query_pairs().find(|(key, _)| key == "id") {
            return id.into_owned();
        }
        url.path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .map(str::to_string)
            .unwrap_or_else(|| self.url.clone())
    }
}

impl fmt::Display for Contributor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.character {
            Some(character) => write!(
                f,
                "{}: {} | {} | {}",
                self.role, self.name, character, self.url
            ),
            None => write!(f, "{}: {} | {}", self.role, self.name, self.url),
        }
    }
}

/// Parse every line; the first malformed one fails the whole batch
pub fn parse_lines(lines: &[String]) -> Result<Vec<Contributor>> {
    lines
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| Contributor::parse(line))
        .collect()
}

/// Parallel payload arrays derived from contributor lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContributorColumn {
    Names,
    Ids,
    Importances,
    Roles,
}

pub fn column(contributors: &[Contributor], column: ContributorColumn) -> Value {
    let values = contributors.iter().map(|c| match column {
        ContributorColumn::Names => Value::from(c.name.clone()),
        ContributorColumn::Ids => Value::from(c.external_id()),
        ContributorColumn::Importances => Value::from(c.role.importance()),
        ContributorColumn::Roles => Value::from(c.character.clone().unwrap_or_default()),
    });
    Value::Array(values.collect())
}

// ═══════════════════════════════════════════════════════════════
// PROMPT LOOP
// ═══════════════════════════════════════════════════════════════

/// Worker asking for contributors until the user stops
///
/// Each round picks a role, resolves a name through the metadata client
/// (offering to create unknown entities) and emits one contributor line.
/// Giving up on a name returns to the role choice.
pub struct ContributorsWorker {
    client: Arc<dyn MetadataClient>,
}

impl ContributorsWorker {
    pub fn new(client: Arc<dyn MetadataClient>) -> Self {
        Self { client }
    }
}

async fn ask_role(ctx: &JobContext) -> Result<Option<ContributorRole>> {
    let options = ContributorRole::ALL
        .into_iter()
        .map(|role| {
            ChoiceOption::new(
                format!("Add {}", role.tag().to_lowercase()),
                role.tag(),
            )
        })
        .chain([ChoiceOption::new("Stop adding contributors", Value::Null)]);

    let options: Vec<ChoiceOption> = options.collect();

    loop {
        let answer = ctx
            .add_prompt(Prompt::choice("Add contributor", options.clone()))
            .await?;
        match answer.value() {
            Some(value) => return Ok(value.as_str().and_then(ContributorRole::from_tag)),
            None => ctx.warn(format!("'{}' is not one of the options", answer.text())),
        }
    }
}

#[async_trait]
impl Worker for ContributorsWorker {
    async fn run(&self, ctx: JobContext) -> Result<()> {
        while let Some(role) = ask_role(&ctx).await? {
            let question = format!("{} name:", role.tag());
            let Some(entity) = resolve_entity(&ctx, self.client.as_ref(), &question, "").await?
            else {
                continue;
            };

            let character = if role.has_character() {
                let text = ctx
                    .ask_text(&format!("{} role (optional):", entity.name), "")
                    .await?;
                Some(text.trim().to_string()).filter(|c| !c.is_empty())
            } else {
                None
            };

            let contributor = Contributor {
                role,
                name: entity.name,
                character,
                url: entity.url,
            };
            ctx.send(contributor.to_string())?;
        }
        Ok(())
    }
}
