use vergen::{BuildBuilder, CargoBuilder, Emitter, RustcBuilder};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let build = BuildBuilder::all_build()?;
    let cargo = CargoBuilder::all_cargo()?;
    let rustc = RustcBuilder::all_rustc()?;

    // Build-time defaults for the completion endpoint and system message.
    println!("cargo:rerun-if-env-changed=PALAVER_DEFAULT_API_ENDPOINT");
    println!("cargo:rerun-if-env-changed=PALAVER_DEFAULT_SYSTEM_MESSAGE");

    Emitter::default()
        .add_instructions(&build)?
        .add_instructions(&cargo)?
        .add_instructions(&rustc)?
        .emit()?;

    Ok(())
}
