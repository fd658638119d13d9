//! Print the AuraInstance CustomResourceDefinition as YAML

use kube::CustomResourceExt;
use neo4j_aura_operator::crd::AuraInstance;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&AuraInstance::crd())?);
    Ok(())
}
