//! Project naming from the editor's open folders.

use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectInfo {
    /// Explicit project name from the editor's project file.
    pub project: Option<String>,
    /// Folder-derived fallback for wakatime-cli's own detection.
    pub alternate_project: Option<String>,
}

pub fn resolve_project(
    entity: &str,
    folders: &[String],
    project_name: Option<&str>,
) -> ProjectInfo {
    let project = project_name
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(project_display_name);

    ProjectInfo {
        alternate_project: if project.is_some() {
            None
        } else {
            find_project_from_folders(folders, entity)
        },
        project,
    }
}

/// Base name of the deepest open folder containing `entity`.
///
/// Containment is component-wise so `/src/app` does not claim
/// `/src/application/main.rs`.
pub fn find_project_from_folders(folders: &[String], entity: &str) -> Option<String> {
    let entity_path = Path::new(entity);

    folders
        .iter()
        .map(Path::new)
        .filter(|folder| entity_path.starts_with(folder))
        .max_by_key(|folder| folder.components().count())
        .and_then(|folder| folder.file_name())
        .map(|name| name.to_string_lossy().to_string())
}

/// Project files are reported as paths like `/code/app.sublime-project`;
/// the project is the file stem.
fn project_display_name(name: &str) -> String {
    let path = Path::new(name);
    if path.extension().is_some() && path.components().count() > 1 {
        if let Some(stem) = path.file_stem() {
            return stem.to_string_lossy().to_string();
        }
    }
    name.to_string()
}
