//! List the encoder profiles.

use heliomovie_movie_model::ProfileKind;

pub fn run(json: bool) -> anyhow::Result<()> {
    if json {
        let profiles: Vec<_> = ProfileKind::ALL.iter().map(|k| k.profile()).collect();
        println!("{}", serde_json::to_string_pretty(&profiles)?);
        return Ok(());
    }

    for kind in ProfileKind::ALL {
        let profile = kind.profile();
        println!("{kind} (v{})", profile.version);
        println!("  Artifact: {}", profile.artifact_name("<job>"));
        println!("  Codec: {} / {}", profile.codec, profile.pixel_format);
        match profile.max_geometry {
            Some((w, h)) => println!("  Max geometry: {w}x{h}"),
            None => println!("  Max geometry: unbounded"),
        }
        println!("  Params: {}", profile.params.join(" "));
    }
    Ok(())
}
