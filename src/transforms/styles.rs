//! Stylesheet compilation and vendor prefixing.
//!
//! SCSS (and the indented syntax) is compiled with grass; lightningcss then
//! minifies the result and adds the prefixes a browserslist query needs.

use crate::build::{is_partial, Asset, Transform};
use grass::{InputSyntax, OutputStyle};
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use std::path::Path;

/// Compile a stylesheet to CSS.
///
/// Files whose name starts with `_` are import-only partials and are
/// dropped from the class. `@import` resolves against the directory of the
/// file being compiled.
#[derive(Debug, Clone)]
pub struct CompileStyles {
    compressed: bool,
}

impl CompileStyles {
    /// Create the transform; `compressed` emits minified output.
    pub fn new(compressed: bool) -> Self {
        Self { compressed }
    }
}

impl Transform for CompileStyles {
    fn name(&self) -> &str {
        "compile-styles"
    }

    fn accepts(&self, asset: &Asset) -> bool {
        !is_partial(&asset.source)
    }

    fn apply(&self, mut asset: Asset) -> Result<Asset, String> {
        let css = compile_dialect(&asset)?;
        let code = render(&css, &asset.source, Targets::default(), self.compressed)?;
        asset.contents = code.into_bytes();
        asset.set_extension("css");
        Ok(asset)
    }
}

/// Add vendor prefixes required by a browserslist query.
#[derive(Debug, Clone)]
pub struct Autoprefix {
    browsers: Browsers,
}

impl Autoprefix {
    /// Create the transform from queries like `"last 2 versions"` or
    /// `"safari 15.4"`.
    pub fn new(queries: &[String]) -> Result<Self, String> {
        Ok(Self {
            browsers: parse_browsers(queries)?,
        })
    }
}

impl Transform for Autoprefix {
    fn name(&self) -> &str {
        "autoprefix"
    }

    fn apply(&self, mut asset: Asset) -> Result<Asset, String> {
        let code = render(
            asset.text()?,
            &asset.source,
            Targets::from(self.browsers),
            true,
        )?;
        asset.contents = code.into_bytes();
        Ok(asset)
    }
}

/// Compile the source dialect (picked by extension) to plain CSS.
fn compile_dialect(asset: &Asset) -> Result<String, String> {
    let syntax = match asset
        .source
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("sass") => InputSyntax::Sass,
        Some("css") => InputSyntax::Css,
        _ => InputSyntax::Scss,
    };

    let mut options = grass::Options::default()
        .style(OutputStyle::Expanded)
        .input_syntax(syntax);
    if let Some(dir) = asset.source.parent() {
        options = options.load_path(dir);
    }

    grass::from_string(asset.text()?.to_string(), &options)
        .map_err(|e| format!("{}: {}", asset.source.display(), e))
}

/// Parse, minify for `targets` (which is where prefixes are added) and print.
fn render(css: &str, source: &Path, targets: Targets, minify: bool) -> Result<String, String> {
    let options = ParserOptions {
        filename: source.display().to_string(),
        ..ParserOptions::default()
    };

    let mut sheet = StyleSheet::parse(css, options).map_err(|e| e.to_string())?;
    sheet
        .minify(MinifyOptions {
            targets,
            ..MinifyOptions::default()
        })
        .map_err(|e| e.to_string())?;

    let printed = sheet
        .to_css(PrinterOptions {
            minify,
            targets,
            ..PrinterOptions::default()
        })
        .map_err(|e| e.to_string())?;
    Ok(printed.code)
}

/// Resolve browserslist queries (`"last 2 versions"`, `"safari 15.4"`).
pub fn parse_browsers(queries: &[String]) -> Result<Browsers, String> {
    let browsers = Browsers::from_browserslist(queries)
        .map_err(|e| format!("invalid browser query: {}", e))?;
    browsers.ok_or_else(|| format!("'{}' matches no browsers", queries.join(", ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn style(name: &str, css: &str) -> Asset {
        Asset::new(
            format!("app/scss/{}", name),
            name,
            css.as_bytes().to_vec(),
        )
    }

    #[test]
    fn test_compile_styles_compressed() {
        let out = CompileStyles::new(true)
            .apply(style("main.scss", "body {\n  color: red;\n}\n"))
            .unwrap();
        assert_eq!(out.text().unwrap(), "body{color:red}");
        assert_eq!(out.relative, std::path::PathBuf::from("main.css"));
    }

    #[test]
    fn test_compile_styles_expanded() {
        let out = CompileStyles::new(false)
            .apply(style("main.scss", "body{color:red}"))
            .unwrap();
        assert!(out.text().unwrap().contains("color: red"));
    }

    #[test]
    fn test_compile_styles_variables_and_nesting() {
        let source = "$c: red;\n.a {\n  .b { color: $c; }\n  &:hover { color: blue; }\n}\n";
        let out = CompileStyles::new(true)
            .apply(style("main.scss", source))
            .unwrap();
        let css = out.text().unwrap();
        assert!(css.contains(".a .b{color:red}"), "{}", css);
        assert!(css.contains(".a:hover"), "{}", css);
        assert!(!css.contains('$'), "{}", css);
        assert!(!css.contains('&'), "{}", css);
    }

    #[test]
    fn test_compile_styles_resolves_partial_imports() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("scss");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("_vars.scss"), "$c: red;\n").unwrap();

        let main = dir.join("main.scss");
        let asset = Asset::new(
            &main,
            "main.scss",
            b"@import 'vars';\nbody { color: $c; }\n".to_vec(),
        );

        let out = CompileStyles::new(true).apply(asset).unwrap();
        assert_eq!(out.text().unwrap(), "body{color:red}");
    }

    #[test]
    fn test_compile_styles_reports_missing_import() {
        let temp = TempDir::new().unwrap();
        let asset = Asset::new(
            temp.path().join("main.scss"),
            "main.scss",
            b"@import 'nope';\n".to_vec(),
        );
        assert!(CompileStyles::new(true).apply(asset).is_err());
    }

    #[test]
    fn test_compile_styles_rejects_malformed() {
        let err = CompileStyles::new(true).apply(style("bad.scss", "..broken { color: red; }"));
        assert!(err.is_err());

        let undefined = CompileStyles::new(true).apply(style("bad.scss", "a { color: $nope; }"));
        assert!(undefined.is_err());
    }

    #[test]
    fn test_compile_styles_skips_partials() {
        let transform = CompileStyles::new(true);
        assert!(!transform.accepts(&style("_vars.scss", "")));
        assert!(transform.accepts(&style("main.scss", "")));
    }

    #[test]
    fn test_autoprefix_adds_webkit_prefix() {
        let transform = Autoprefix::new(&["safari 12".to_string()]).unwrap();
        let out = transform
            .apply(style("main.css", ".a{user-select:none}"))
            .unwrap();
        let css = out.text().unwrap();
        assert!(css.contains("-webkit-user-select"), "{}", css);
    }

    #[test]
    fn test_parse_browsers() {
        let browsers = parse_browsers(&[
            "chrome 120".to_string(),
            "safari 15.4".to_string(),
            "safari 16".to_string(),
        ])
        .unwrap();
        assert_eq!(browsers.chrome, Some(120 << 16));
        assert_eq!(browsers.safari, Some((15 << 16) | (4 << 8)));
        assert_eq!(browsers.firefox, None);
    }

    #[test]
    fn test_parse_browsers_last_versions_query() {
        let browsers = parse_browsers(&["last 2 versions".to_string()]).unwrap();
        assert!(browsers.chrome.is_some());
        assert!(browsers.firefox.is_some());
        assert!(browsers.safari.is_some());
    }

    #[test]
    fn test_parse_browsers_errors() {
        assert!(parse_browsers(&["netscape 4".to_string()]).is_err());
        assert!(parse_browsers(&["chrome x".to_string()]).is_err());
        let nonsense = ["not a browser query".to_string()];
        assert!(parse_browsers(&nonsense).is_err());
    }
}
