use anyhow::Result;
use eoscope_core::registry::TaskRegistry;

pub fn run() -> Result<()> {
    let registry = TaskRegistry::with_builtin_tasks()?;
    for name in registry.list_names() {
        println!("{name}");
    }
    Ok(())
}
