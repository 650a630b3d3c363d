use std::path::Path;

use verso_core::app::Verso;

pub async fn handle_init(app: &Verso, path: &Path) -> bool {
    match app.open_project(path).await {
        Ok(project) => {
            println!("Registered '{}' at {}", project.name, project.path.display());
            true
        }
        Err(e) => {
            eprintln!("Failed to register {}: {}", path.display(), e);
            false
        }
    }
}

pub async fn handle_new(app: &Verso, name: &str) -> bool {
    match app.create_project(name).await {
        Ok(project) => {
            println!("Created '{}' at {}", project.name, project.path.display());
            true
        }
        Err(e) => {
            eprintln!("Failed to create project: {}", e);
            false
        }
    }
}

pub async fn handle_projects(app: &Verso) -> bool {
    let projects = app.registry().list().await;
    if projects.is_empty() {
        println!("No projects yet. Create one with `verso new <name>`.");
        return true;
    }

    for project in projects {
        let synced = match project.synced_at {
            Some(at) => format!("synced {}", at.format("%Y-%m-%d %H:%M")),
            None => "never synced".to_string(),
        };
        let marker = if project.path.is_dir() { " " } else { "!" };
        println!(
            "{} {:<24} {:<20} {}",
            marker,
            project.display_name(),
            synced,
            project.path.display()
        );
    }
    true
}
