/// Example: Fetch an STL model and print what the viewer would show
///
/// Usage: cargo run --example load_stl -- <url-or-path>
use std::env;
use stlpin_core::stl;
use stlpin_terminal::Fetcher;

fn main() -> anyhow::Result<()> {
    let Some(source) = env::args().nth(1) else {
        eprintln!("Usage: load_stl <url-or-path>");
        std::process::exit(2);
    };

    println!("Fetching: {}", source);
    let data = Fetcher::new()?.fetch(&source)?;
    let mesh = stl::decode_centered(&data)?;

    println!("Loaded {} triangles ({} bytes)", mesh.len(), data.len());
    match mesh.bounds() {
        Some(bounds) => {
            let size = bounds.size();
            println!("Size: {:.3} x {:.3} x {:.3}", size.x, size.y, size.z);
        }
        None => println!("Model is empty"),
    }
    Ok(())
}
