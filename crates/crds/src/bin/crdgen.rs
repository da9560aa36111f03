//! Prints the Machine CRD as YAML.
//!
//! The Machine API is normally installed by the machine-api operator; this is
//! for development clusters that lack it:
//!
//! ```sh
//! cargo run -p crds --bin crdgen | kubectl apply -f -
//! ```

use crds::Machine;
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&Machine::crd())?);
    Ok(())
}
