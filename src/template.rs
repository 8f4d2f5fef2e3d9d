//! # Template loading and structure
//!
//! Prompt templates for the two conversations the assistant knows:
//! - `assistant`: answer a student's question from their timetable
//!   (placeholders `{context}` and `{question}`),
//! - `reunion`: find shared free slots for two students
//!   (placeholders `{edt1}` and `{edt2}`).
//!
//! Both system prompts may use `{date}`, replaced by today's date in the
//! timetable's timezone when the request is built.
//!
//! Templates live under the configuration directory:
//!
//! ```text
//! <config_dir>/templates/<name>.yaml
//! ```
//!
//! `edt init` writes the built-in versions there so they can be edited.
//!
//! ## Minimal YAML example
//!
//! ```yaml
//! system_prompt: "Nous sommes le {date}. Tu es un assistant universitaire."
//! user_prompt: "{context}\n\nQuestion : {question}"
//! ```

use serde::{Deserialize, Serialize};
use std::{
    error::Error,
    fs, io,
    path::{Path, PathBuf},
};

pub const ASSISTANT: &str = "assistant";
pub const REUNION: &str = "reunion";

const PERSONA: &str = "Tu es un assistant universitaire virtuel dédié à aider les étudiants de l'Université de la Nouvelle-Calédonie dans leurs études et leur organisation.
Ton rôle est d'offrir des conseils précis sur la gestion du temps, la répartition des matières et les stratégies de révision efficaces, à partir de l'emploi du temps de l'étudiant.
Ton langage reste professionnel, respectueux et adapté à un contexte universitaire. Tu réponds en français.
**Présente les plannings sous forme de tableau pour faciliter la lecture.**";

/// A system prompt plus a user prompt with placeholders.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatTemplate {
    /// Persona of the assistant; `{date}` is substituted.
    pub system_prompt: String,

    /// Body of the user message.
    pub user_prompt: String,
}

impl ChatTemplate {
    /// Built-in question answering template.
    pub fn assistant() -> Self {
        Self {
            system_prompt: format!("Aujourd'hui, nous sommes le {{date}}.\n\n{PERSONA}"),
            user_prompt: "Voici l'emploi du temps de l'étudiant, extrait de son calendrier universitaire :

{context}

------

En t'appuyant sur cet emploi du temps, réponds à la demande suivante : {question}"
                .to_string(),
        }
    }

    /// Built-in meeting planning template.
    pub fn reunion() -> Self {
        Self {
            system_prompt: format!("Aujourd'hui, nous sommes le {{date}}.\n\n{PERSONA}"),
            user_prompt: "Voici les emplois du temps des deux utilisateurs avec leurs cours et leurs horaires.


Utilisateur 1 :
{edt1}

------

Utilisateur 2 :
{edt2}

------

Crée un planning de disponibilités partagées pour permettre aux deux utilisateurs de trouver des créneaux libres pour se rencontrer en dehors de leurs heures de cours.
Identifie les créneaux de disponibilité simultanée en tenant compte des horaires de cours de chacun et propose des créneaux adaptés pour des réunions de travail sur leur projet tutoré.
Donne aussi un bref sommaire des cours des deux utilisateurs.

Assure-toi de respecter ces consignes :

Évite les chevauchements avec les heures de cours.
Propose des créneaux raisonnables en termes de durée, en priorisant des créneaux d'une à deux heures.
Le résultat attendu est un tableau des disponibilités communes entre les deux utilisateurs."
                .to_string(),
        }
    }

    /// Built-in template called `name`, if any.
    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            ASSISTANT => Some(Self::assistant()),
            REUNION => Some(Self::reunion()),
            _ => None,
        }
    }

    pub fn system(&self, date: &str) -> String {
        render(&self.system_prompt, &[("date", date)])
    }

    pub fn user(&self, vars: &[(&str, &str)]) -> String {
        render(&self.user_prompt, vars)
    }
}

/// Replace every `{key}` of `text` by its value. Unknown placeholders are left as is.
///
/// Substituted values are never scanned again, so a value containing `{key}`
/// comes out verbatim.
pub fn render(text: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let candidate = &rest[open + 1..];
        let value = candidate.find('}').and_then(|close| {
            let key = &candidate[..close];
            vars.iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| (*value, close))
        });
        match value {
            Some((value, close)) => {
                out.push_str(value);
                rest = &candidate[close + 1..];
            }
            None => {
                out.push('{');
                rest = candidate;
            }
        }
    }
    out.push_str(rest);
    out
}

fn template_path(dir: &Path, name: &str) -> PathBuf {
    dir.join("templates").join(format!("{name}.yaml"))
}

/// Load a template from `<dir>/templates/<name>.yaml`.
pub fn load_template_from(dir: &Path, name: &str) -> Result<ChatTemplate, Box<dyn Error>> {
    let path = template_path(dir, name);
    tracing::info!("Loading template: {}", path.display());

    let content = fs::read_to_string(path)?;
    let template: ChatTemplate = serde_yaml::from_str(&content)?;
    Ok(template)
}

/// Load a template by name from the user's config directory.
///
/// A missing file falls back to the built-in template of the same name;
/// unreadable or invalid files are errors.
///
/// ```no_run
/// use edt_assistant::template::load_template;
///
/// # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
/// let tpl = load_template("assistant").await?;
/// assert!(tpl.user_prompt.contains("{question}"));
/// # Ok(()) }
/// ```
pub async fn load_template(name: &str) -> Result<ChatTemplate, Box<dyn Error>> {
    let dir = crate::config_dir()?;
    match load_template_from(&dir, name) {
        Ok(template) => Ok(template),
        Err(e) => match (e.downcast_ref::<io::Error>(), ChatTemplate::builtin(name)) {
            (Some(io_err), Some(builtin)) if io_err.kind() == io::ErrorKind::NotFound => {
                tracing::info!("Template {name} not found, using the built-in one");
                Ok(builtin)
            }
            _ => Err(e),
        },
    }
}

/// Write the built-in templates under `<dir>/templates/`.
pub fn write_default_templates(dir: &Path) -> Result<(), Box<dyn Error>> {
    let templates_dir = dir.join("templates");
    tracing::info!("Creating template config directory: {}", templates_dir.display());
    fs::create_dir_all(&templates_dir)?;

    for (name, template) in [
        (ASSISTANT, ChatTemplate::assistant()),
        (REUNION, ChatTemplate::reunion()),
    ] {
        let path = template_path(dir, name);
        tracing::info!("Creating template file: {}", path.display());
        fs::write(path, serde_yaml::to_string(&template)?)?;
    }
    Ok(())
}
