use kube::core::CustomResourceExt;
use store_operator::crd::Store;

fn main() -> anyhow::Result<()> {
    let yaml = serde_yaml::to_string(&Store::crd())?;
    print!("{yaml}");
    Ok(())
}
