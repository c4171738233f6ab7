//! Page markup for the dashboard. Map drawing is done client side by plotly.js;
//! the server only supplies figure JSON.

use crate::error::MapError;
use crate::render::MapFigure;

const PLOTLY_CDN: &str = "https://cdn.plot.ly/plotly-2.35.2.min.js";

const INDEX_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{{TITLE}}</title>
<script src="{{PLOTLY}}"></script>
<style>
  body { font-family: sans-serif; margin: 2rem auto; max-width: 1100px; color: #262730; }
  .error { background: #ffe1e1; color: #7d1a1a; padding: .75rem 1rem; border-radius: .4rem; margin: .5rem 0; }
  .filters { display: flex; gap: 2rem; margin: 1rem 0; }
  .filters label { display: block; font-size: .9rem; margin-bottom: .3rem; }
  .filters select { min-width: 260px; min-height: 8rem; }
  .meta { color: #6b6f76; font-size: .85rem; }
</style>
</head>
<body>
<h1>{{TITLE}}</h1>
<input id="upload" type="file" accept=".csv,text/csv">
<div id="errors"></div>
<section id="results" hidden>
  <h2>{{SUBHEADER}}</h2>
  <div id="filters" class="filters"></div>
  <div id="meta" class="meta"></div>
  <div id="map"></div>
</section>
<script>
const state = { file: null, selection: {}, latest: 0 };

document.getElementById("upload").addEventListener("change", async (event) => {
  const file = event.target.files[0];
  if (!file) return;
  state.file = file;
  state.selection = {};
  await renderPass();
});

function showError(message) {
  const banner = document.createElement("div");
  banner.className = "error";
  banner.textContent = message;
  document.getElementById("errors").appendChild(banner);
}

function drawFilters(filters) {
  const container = document.getElementById("filters");
  container.replaceChildren();
  for (const filter of filters) {
    const wrapper = document.createElement("div");
    const label = document.createElement("label");
    label.textContent = `Filter by ${filter.column}:`;
    const select = document.createElement("select");
    select.multiple = true;
    for (const option of filter.options) {
      const item = new Option(option, option, false, filter.selected.includes(option));
      select.appendChild(item);
    }
    select.addEventListener("change", async () => {
      state.selection[filter.column] = Array.from(select.selectedOptions, (o) => o.value);
      await renderPass();
    });
    wrapper.append(label, select);
    container.appendChild(wrapper);
  }
}

async function readBody(response) {
  const text = await response.text();
  try {
    return JSON.parse(text);
  } catch (_) {
    return { kind: "http_error", message: text || `HTTP ${response.status}` };
  }
}

async function renderPass() {
  // Only the newest request may touch the page
  const request = ++state.latest;
  const url = `/api/render?selection=${encodeURIComponent(JSON.stringify(state.selection))}`;
  let response;
  let body;
  try {
    response = await fetch(url, { method: "POST", body: state.file });
    body = await readBody(response);
  } catch (err) {
    if (request !== state.latest) return;
    document.getElementById("errors").replaceChildren();
    showError(`Request failed: ${err}`);
    return;
  }
  if (request !== state.latest) return;

  document.getElementById("errors").replaceChildren();
  if (!response.ok) {
    document.getElementById("results").hidden = true;
    Plotly.purge("map");
    showError(body.message);
    return;
  }

  document.getElementById("results").hidden = false;
  drawFilters(body.filters);
  document.getElementById("meta").textContent =
    `${body.filtered_rows} of ${body.total_rows} rows selected`;

  if (body.error) {
    Plotly.purge("map");
    showError(body.error.message);
    return;
  }
  Plotly.react("map", body.map.figure.data, body.map.figure.layout, { responsive: true });
}
</script>
</body>
</html>
"#;

const STANDALONE_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{{TITLE}}</title>
<script src="{{PLOTLY}}"></script>
</head>
<body>
<h1>{{TITLE}}</h1>
<h2>{{SUBHEADER}}</h2>
<div id="map"></div>
<script>
const figure = {{FIGURE}};
Plotly.newPlot("map", figure.data, figure.layout, { responsive: true });
</script>
</body>
</html>
"#;

/// Interactive page served at `/`.
pub fn index_page(title: &str, subheader: &str) -> String {
    INDEX_TEMPLATE
        .replace("{{PLOTLY}}", PLOTLY_CDN)
        .replace("{{TITLE}}", &escape(title))
        .replace("{{SUBHEADER}}", &escape(subheader))
}

/// Self-contained page with the figure inlined.
pub fn standalone_page(title: &str, subheader: &str, figure: &MapFigure) -> Result<String, MapError> {
    // "</" would close the script element early
    let figure = figure.to_json()?.replace("</", "<\\/");
    Ok(STANDALONE_TEMPLATE
        .replace("{{PLOTLY}}", PLOTLY_CDN)
        .replace("{{TITLE}}", &escape(title))
        .replace("{{SUBHEADER}}", &escape(subheader))
        .replace("{{FIGURE}}", &figure))
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapConfig;
    use crate::data::{geometry_from_geojson, parse_csv};
    use crate::render::build_map;

    #[test]
    fn index_page_escapes_titles() {
        let page = index_page("Fields <North>", "Predicted Value Map");
        assert!(page.contains("<h1>Fields &lt;North&gt;</h1>"));
        assert!(page.contains("<h2>Predicted Value Map</h2>"));
        assert!(page.contains(PLOTLY_CDN));
        assert!(!page.contains("{{"));
    }

    #[test]
    fn index_page_sends_raw_uploads_and_guards_stale_responses() {
        let page = index_page("Field Mapping", "Predicted Value Map");
        assert!(page.contains("body: state.file"));
        assert!(!page.contains("file.text()"));
        assert!(page.contains("if (request !== state.latest) return;"));
        // Non-JSON error bodies still reach the banner
        assert!(page.contains("response.text()"));
    }

    #[test]
    fn standalone_page_inlines_the_figure() {
        let geometry = geometry_from_geojson(
            r#"{"type": "FeatureCollection", "features": [
                {"type": "Feature", "properties": {"Field_ID": "</script>"},
                 "geometry": {"type": "Polygon", "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]]}}
            ]}"#
            .parse()
            .unwrap(),
            "Field_ID",
        )
        .unwrap();
        let table = parse_csv("Field_ID\n</script>\n".as_bytes(), b',').unwrap();
        let rendered = build_map(&table, &geometry, &MapConfig::default()).unwrap();

        let page = standalone_page("Field Mapping", "Predicted Value Map", &rendered.figure).unwrap();

        assert!(page.contains("\"type\":\"choroplethmapbox\""));
        assert!(page.contains("<\\/script>"));
        assert_eq!(page.matches("</script>").count(), 2);
    }
}
