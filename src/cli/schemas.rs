use super::ui;
use crate::database::{SchemaFile, load_schema_files};
use anyhow::{Context, Result};
use comfy_table::Cell;
use std::path::Path;

impl SchemaFile {
    pub fn display_as_table(&self) -> String {
        let mut table = ui::new_styled_table();

        table.set_header(vec![
            ui::header_cell("Field"),
            ui::header_cell("Type"),
            ui::header_cell("Required"),
            ui::header_cell("Default"),
            ui::header_cell("TTL (s)"),
        ]);

        for field in &self.schema.fields {
            table.add_row(vec![
                Cell::new(&field.name),
                Cell::new(field.field_type.to_string()),
                ui::flag_cell(field.required),
                ui::format_optional_cell(field.default.as_ref(), |v| v.to_string()),
                ui::format_optional_cell(field.ttl, |s| s.to_string()),
            ]);
        }

        let mode = if self.schema.options.strict {
            "strict"
        } else {
            "loose"
        };
        format!(
            "Schema: {} {}\n\n{}",
            ui::style_text(&self.name, ui::StyleType::Title),
            ui::style_text(&format!("({mode})"), ui::StyleType::Subtle),
            table
        )
    }
}

/// Renders every schema file in `dir`.
pub fn render_schemas(dir: &Path, ignored: &[String]) -> Result<String> {
    let files = load_schema_files(dir, ignored)?;
    if files.is_empty() {
        return Ok(format!("No schema files in {}", dir.display()));
    }
    Ok(files
        .iter()
        .map(SchemaFile::display_as_table)
        .collect::<Vec<_>>()
        .join("\n\n"))
}

pub fn display_schemas(
    dir: Option<&Path>,
    schema_folder: Option<&str>,
    ignored: &[String],
) -> Result<()> {
    let dir = dir
        .or(schema_folder.map(Path::new))
        .context("No schema folder given; pass --dir or set `schema_folder_path`")?;
    println!("{}", render_schemas(dir, ignored)?);
    Ok(())
}
