//! Chart template rendering with MiniJinja
//!
//! Templates see three variables: `values` (the chart's values), `release`
//! (name, namespace, revision, isInstall, isUpgrade, service) and `chart`
//! (the chart metadata). Templates whose file name starts with `_` are
//! helpers: available to `include`/`import`, never rendered on their own.

use base64::Engine as _;
use minijinja::{Environment, Error, ErrorKind, UndefinedBehavior, Value};
use serde::Serialize;

use berth_core::ChartArtifact;

use crate::error::{KubeError, Result};

const NOTES_FILE: &str = "NOTES.txt";

/// Release fields exposed to templates
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseInfo {
    pub name: String,
    pub namespace: String,
    pub revision: u32,
    pub is_install: bool,
    pub is_upgrade: bool,
    pub service: &'static str,
}

impl ReleaseInfo {
    pub fn install(name: &str, namespace: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            revision: 1,
            is_install: true,
            is_upgrade: false,
            service: "Berth",
        }
    }

    pub fn upgrade(name: &str, namespace: &str, revision: u32) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            revision,
            is_install: false,
            is_upgrade: true,
            service: "Berth",
        }
    }
}

/// Render every manifest template of `chart` into one multi-document manifest
pub fn render_manifest(chart: &ChartArtifact, release: &ReleaseInfo) -> Result<String> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Chainable);
    env.add_filter("toyaml", toyaml);
    env.add_filter("tojson", tojson);
    env.add_filter("b64encode", b64encode);
    env.add_filter("quote", quote);
    env.add_filter("nindent", nindent);
    env.add_filter("indent", indent);

    for template in &chart.templates {
        let source = template.text().ok_or_else(|| {
            KubeError::Template(format!("{} is not valid UTF-8", template.name))
        })?;
        env.add_template_owned(template.name.clone(), source.to_string())
            .map_err(|e| KubeError::Template(format!("{}: {}", template.name, e)))?;
    }

    let ctx = minijinja::context! {
        values => &chart.values,
        release => release,
        chart => &chart.metadata,
    };

    let mut documents = Vec::new();
    for template in chart.templates.iter().filter(|t| is_manifest(&t.name)) {
        let rendered = env
            .get_template(&template.name)
            .and_then(|tmpl| tmpl.render(&ctx))
            .map_err(|e| KubeError::Template(format!("{}: {:#}", template.name, e)))?;

        let body = rendered.trim();
        if body.is_empty() {
            continue;
        }
        documents.push(format!(
            "# Source: {}/{}\n{}",
            chart.name(),
            template.name,
            body.trim_start_matches("---").trim_start()
        ));
    }

    Ok(documents.join("\n---\n"))
}

fn is_manifest(name: &str) -> bool {
    let file_name = name.rsplit('/').next().unwrap_or(name);
    !file_name.starts_with('_') && file_name != NOTES_FILE
}

fn invalid(e: impl std::fmt::Display) -> Error {
    Error::new(ErrorKind::InvalidOperation, e.to_string())
}

fn toyaml(value: Value) -> std::result::Result<String, Error> {
    let json: serde_json::Value = serde_json::to_value(&value).map_err(invalid)?;
    let yaml = serde_yaml::to_string(&json).map_err(invalid)?;
    Ok(yaml.trim_start_matches("---\n").trim_end().to_string())
}

fn tojson(value: Value) -> std::result::Result<String, Error> {
    let json: serde_json::Value = serde_json::to_value(&value).map_err(invalid)?;
    serde_json::to_string(&json).map_err(invalid)
}

fn b64encode(value: String) -> String {
    base64::engine::general_purpose::STANDARD.encode(value.as_bytes())
}

fn quote(value: Value) -> String {
    let text = value
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| value.to_string());
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

fn indent(value: String, spaces: usize) -> String {
    let pad = " ".repeat(spaces);
    value
        .lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{}{}", pad, line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn nindent(value: String, spaces: usize) -> String {
    format!("\n{}", indent(value, spaces))
}
