//! Runner artifacts (`log.html`, `output.xml`) attached as File variables.
//!
//! # 学習ポイント
//! - screenshot は data URI にして report に埋め込む (sandbox 削除後も見える)
//! - `output.xml` では HTML が escape されて入る (`&lt;img src="..."&gt;`)
//! - 埋め込むのは `roots` 配下の file だけ

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use regex::Regex;

use crate::domain::{TypedVariable, VariableSet};

pub const LOG_HTML: &str = "log.html";
pub const OUTPUT_XML: &str = "output.xml";

const IMAGE_FALLBACK_MIMETYPE: &str = "image/png";

static IMG_SRC: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"img src=(?:"([^"]+)"|&quot;(.+?)&quot;)"#).ok());

/// Attribute quoting: plain HTML, or entity-escaped inside XML text.
const QUOTES: [&str; 2] = ["\"", "&quot;"];

/// `data:<mimetype>;base64,<data>`
pub fn data_uri(mimetype: &str, data: &[u8]) -> String {
    format!("data:{mimetype};base64,{}", STANDARD.encode(data))
}

/// Rewrite image references in an HTML document as data URIs.
///
/// Works on HTML embedded in `output.xml` as well, where the markup is
/// escaped and attributes may be quoted with `&quot;`.
///
/// Sources are looked up as absolute paths, relative to the document, then
/// relative to the working directory; only files inside one of `roots` are
/// embedded. Links wrapping an embedded image are dropped and a fixed
/// `width="800px"` becomes a `max-width` style.
pub fn inline_images(html: &str, base_dir: &Path, working_dir: &Path, roots: &[&Path]) -> String {
    let Some(re) = IMG_SRC.as_ref() else {
        return html.to_string();
    };

    let mut replacements: BTreeMap<String, String> = BTreeMap::new();
    for caps in re.captures_iter(html) {
        let Some(src) = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str()) else {
            continue;
        };
        if src.starts_with("data:") || replacements.contains_key(src) {
            continue;
        }
        let Some(path) = resolve_image(src, base_dir, working_dir, roots) else {
            continue;
        };
        let Ok(bytes) = std::fs::read(&path) else {
            continue;
        };
        let mimetype = mime_guess::from_path(&path)
            .first_raw()
            .unwrap_or(IMAGE_FALLBACK_MIMETYPE);
        replacements.insert(src.to_string(), data_uri(mimetype, &bytes));
    }

    // 置換は長い形から: link → 幅指定つき → 素の img
    let mut out = html.to_string();
    for (src, uri) in &replacements {
        for q in QUOTES {
            out = out.replace(&format!("a href={q}{src}{q}"), "a");
            out = out.replace(
                &format!("img src={q}{src}{q} width={q}800px{q}"),
                &format!("img src={q}{uri}{q} style={q}max-width:800px;{q}"),
            );
            out = out.replace(
                &format!("img src={q}{src}{q}"),
                &format!("img src={q}{uri}{q}"),
            );
        }
    }
    out
}

/// 候補を順に canonicalize し、`roots` の外を指すもの (`..` や symlink) は捨てる
fn resolve_image(src: &str, base_dir: &Path, working_dir: &Path, roots: &[&Path]) -> Option<PathBuf> {
    let given = Path::new(src);
    let candidates = [given.to_path_buf(), base_dir.join(given), working_dir.join(given)];
    let roots: Vec<PathBuf> = roots.iter().filter_map(|r| r.canonicalize().ok()).collect();
    candidates
        .iter()
        .filter(|c| c.is_absolute())
        .filter_map(|c| c.canonicalize().ok())
        .find(|c| c.is_file() && roots.iter().any(|r| c.starts_with(r)))
}

/// Attach `log.html` and `output.xml` from the working directory, when the
/// runner produced them. Images are inlined in both, in place.
pub fn attach_artifacts(
    working_dir: &Path,
    roots: &[&Path],
    variables: &mut VariableSet,
) -> std::io::Result<()> {
    for (name, mimetype) in [(LOG_HTML, "text/html"), (OUTPUT_XML, "text/xml")] {
        let path = working_dir.join(name);
        if path.is_file() {
            let bytes = inline_file(&path, working_dir, roots)?;
            variables.insert(name.to_string(), TypedVariable::file(&bytes, name, mimetype));
        }
    }
    Ok(())
}

/// Inline images in the report at `path` and return its new content.
fn inline_file(path: &Path, working_dir: &Path, roots: &[&Path]) -> std::io::Result<Vec<u8>> {
    let bytes = std::fs::read(path)?;
    // a report that is not UTF-8 is attached untouched
    match String::from_utf8(bytes) {
        Ok(text) => {
            let inlined = inline_images(&text, working_dir, working_dir, roots);
            if inlined != text {
                std::fs::write(path, &inlined)?;
            }
            Ok(inlined.into_bytes())
        }
        Err(e) => Ok(e.into_bytes()),
    }
}
