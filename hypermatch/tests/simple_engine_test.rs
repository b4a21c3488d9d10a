use anyhow::Result;
use hypermatch::{Engine, EngineConfig, MatchError, SimpleEngine};

#[test]
fn test_scenarios_match_pooled_engine() -> Result<()> {
    let engine = SimpleEngine::default();

    engine.update(&["/corpus/"])?;
    assert_eq!(engine.match_strings(&["corpus"])?, vec!["corpus"]);

    engine.update(&["/cOrPuS/i"])?;
    assert_eq!(engine.match_strings(&["corpus"])?, vec!["cOrPuS"]);

    engine.update(&["/cOrPuS/i", "/pus/i"])?;
    assert_eq!(engine.match_strings(&["corpus"])?, vec!["cOrPuS", "pus"]);

    engine.update(&["/^cOrPuS$/i"])?;
    assert!(engine
        .match_strings(&["somethingfirstthencorpusafter"])?
        .is_empty());
    Ok(())
}

#[test]
fn test_invalid_pattern_reported() {
    let engine = SimpleEngine::default();
    let err = engine.update(&["/ok/", "/pattern/z"]).unwrap_err();
    assert!(matches!(err, MatchError::Parse { ref expression, .. } if expression == "/pattern/z"));
    assert!(!engine.is_loaded());
}

#[test]
fn test_vectored_corpus() -> Result<()> {
    let engine = SimpleEngine::default();
    engine.update(&["/corpus/", "/^rp/"])?;
    let blocks: [&[u8]; 3] = [b"co", b"rp", b"us"];
    assert_eq!(engine.match_corpus(&blocks)?, vec!["corpus"]);
    Ok(())
}

#[test]
fn test_close_then_reload() -> Result<()> {
    let engine = SimpleEngine::new(EngineConfig::default());
    engine.update(&["/corpus/"])?;
    engine.close()?;
    assert!(matches!(
        engine.match_strings(&["corpus"]),
        Err(MatchError::Unloaded)
    ));

    engine.update(&["/pus/"])?;
    assert_eq!(engine.match_strings(&["corpus"])?, vec!["pus"]);
    assert_eq!(engine.metrics().snapshot().updates, 2);
    Ok(())
}
