//! HTTP surface: the root page, the session WebSocket and optional static assets.

use std::path::PathBuf;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::{Html, IntoResponse},
    routing::get,
};
use maud::{DOCTYPE, PreEscaped, html};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::RelayState;
use crate::websocket::handle_websocket;

pub fn router(state: RelayState, static_dir: Option<PathBuf>) -> Router {
    let router = Router::new()
        .route("/", get(index))
        .route("/ws", get(websocket_handler))
        .with_state(state);

    let router = match static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    };

    router.layer(TraceLayer::new_for_http())
}

async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<RelayState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

async fn index(State(state): State<RelayState>) -> impl IntoResponse {
    let connected = state.broadcaster.upstream_connected().await;

    let markup = html! {
        (DOCTYPE)
        html {
            head {
                meta charset="utf-8";
                title { "pylens" }
                style { (PreEscaped(CSS)) }
            }
            body {
                header {
                    h1 { "pylens" }
                    span id="status" class=(if connected { "status connected" } else { "status" }) {
                        @if connected { "Connected" } @else { "Waiting for Python connection..." }
                    }
                }
                main {
                    section class="console" {
                        pre id="output" {}
                        textarea id="code" rows="4"
                            placeholder="Python code. Ctrl+Enter runs the block." disabled[!connected] {}
                        button id="run" disabled[!connected] { "Run" }
                    }
                    section class="inspector" {
                        div class="nav" {
                            button id="back" disabled { "\u{2190}" }
                            button id="forward" disabled { "\u{2192}" }
                            input id="path" type="text" placeholder="Expression to inspect";
                            button id="inspect" { "Inspect" }
                            button id="modules" { "sys.modules" }
                        }
                        div id="tree" {}
                    }
                }
                script { (PreEscaped(JAVASCRIPT)) }
            }
        }
    };

    Html(markup.into_string())
}

const CSS: &str = r#"
    * { box-sizing: border-box; margin: 0; padding: 0; }
    body {
        font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
        background: #1e1e1e;
        color: #d4d4d4;
        min-height: 100vh;
    }
    header {
        display: flex;
        align-items: center;
        justify-content: space-between;
        padding: 12px 20px;
        background: #252526;
        border-bottom: 1px solid #3c3c3c;
    }
    h1 { font-size: 1.2rem; }
    .status { color: #f48771; }
    .status.connected { color: #89d185; }
    main { display: grid; grid-template-columns: 1fr 1fr; gap: 16px; padding: 16px; }
    pre, textarea, input {
        font-family: 'SF Mono', Monaco, 'Cascadia Code', monospace;
        font-size: 13px;
    }
    #output {
        height: 60vh;
        overflow: auto;
        background: #000;
        padding: 8px;
        white-space: pre-wrap;
    }
    #output .error { color: #f48771; }
    #output .success { color: #89d185; }
    textarea, input {
        width: 100%;
        background: #2d2d2d;
        color: inherit;
        border: 1px solid #3c3c3c;
        padding: 6px;
        margin-top: 8px;
    }
    button {
        background: #0e639c;
        color: white;
        border: none;
        padding: 6px 12px;
        margin-top: 8px;
        cursor: pointer;
    }
    button:disabled { background: #3c3c3c; cursor: default; }
    .nav { display: flex; gap: 6px; align-items: center; }
    .nav input { margin-top: 8px; }
    #tree { margin-top: 12px; font-family: monospace; font-size: 13px; }
    .row { padding: 2px 0; cursor: pointer; }
    .row:hover { background: #2a2d2e; }
    .kind { color: #569cd6; margin-left: 8px; }
    .sig { color: #9cdcfe; }
    .doc { color: #6a9955; white-space: pre-wrap; margin: 4px 0 8px 16px; }
    .node-error { color: #f48771; }
    h4 { margin: 10px 0 4px; color: #c586c0; }
    .meta { display: grid; grid-template-columns: max-content 1fr; gap: 2px 12px; margin: 6px 0; }
    .meta dt { color: #9cdcfe; }
    .badge { color: #dcdcaa; border: 1px solid #3c3c3c; padding: 0 4px; margin-left: 6px; }
    .detail { color: #808080; margin-left: 16px; }
    .source pre { margin-left: 16px; background: #252526; padding: 4px; white-space: pre-wrap; }
    button.run { margin: 0 0 0 8px; padding: 0 6px; }
"#;

const JAVASCRIPT: &str = r#"
    const output = document.getElementById('output');
    const code = document.getElementById('code');
    const runBtn = document.getElementById('run');
    const pathInput = document.getElementById('path');
    const tree = document.getElementById('tree');
    const backBtn = document.getElementById('back');
    const forwardBtn = document.getElementById('forward');
    const status = document.getElementById('status');

    const history = { entries: [], index: -1 };
    let connected = false;
    let ws = null;

    function append(text, cls) {
        const span = document.createElement('span');
        if (cls) span.className = cls;
        span.textContent = text.endsWith('\n') ? text : text + '\n';
        output.appendChild(span);
        output.scrollTop = output.scrollHeight;
    }

    function send(command) {
        if (!connected || !ws || ws.readyState !== WebSocket.OPEN) {
            append('Waiting for Python connection...', 'error');
            return;
        }
        ws.send(JSON.stringify({ event: 'execute', data: command }));
    }

    function updateNav() {
        backBtn.disabled = history.index <= 0;
        forwardBtn.disabled = history.index >= history.entries.length - 1;
        if (history.index >= 0) pathInput.value = history.entries[history.index];
    }

    function inspectCurrent() {
        updateNav();
        send({ type: 'inspect', expression: history.entries[history.index] });
    }

    function enterPath(path) {
        path = path.trim();
        if (!path) return;
        history.entries = [path];
        history.index = 0;
        inspectCurrent();
    }

    function navigate(path) {
        history.entries = history.entries.slice(0, history.index + 1);
        history.entries.push(path);
        history.index = history.entries.length - 1;
        inspectCurrent();
    }

    function isIdentifier(name) {
        return /^[A-Za-z_][A-Za-z0-9_]*$/.test(name);
    }

    function quoteKey(name) {
        const escaped = name
            .replace(/\\/g, '\\\\')
            .replace(/'/g, "\\'")
            .replace(/\n/g, '\\n')
            .replace(/\r/g, '\\r')
            .replace(/\t/g, '\\t');
        return "'" + escaped + "'";
    }

    function childPath(parent, category, name) {
        const mapping = category === 'dictionary' || parent === 'sys.modules' || parent === 'globals()';
        if (!parent) return isIdentifier(name) ? name : 'globals()[' + quoteKey(name) + ']';
        if (mapping || !isIdentifier(name)) return parent + '[' + quoteKey(name) + ']';
        return parent + '.' + name;
    }

    function usableSignature(sig) {
        return sig && sig !== 'Signature unavailable' ? sig : null;
    }

    function usableDoc(doc) {
        return doc && doc !== 'No documentation available' ? doc : null;
    }

    // Commas inside brackets or string defaults do not split parameters.
    function parameterNames(signature) {
        signature = usableSignature(signature);
        if (!signature) return [];
        const open = signature.indexOf('(');
        if (open < 0) return [];
        let depth = 0, quote = null, escaped = false, current = '';
        const params = [];
        for (const ch of signature.slice(open + 1)) {
            if (quote) {
                current += ch;
                if (escaped) escaped = false;
                else if (ch === '\\') escaped = true;
                else if (ch === quote) quote = null;
                continue;
            }
            if (ch === "'" || ch === '"') {
                quote = ch;
            } else if ('([{'.includes(ch)) {
                depth++;
            } else if (')]}'.includes(ch)) {
                if (depth === 0) break;
                depth--;
            } else if (ch === ',' && depth === 0) {
                params.push(current);
                current = '';
                continue;
            }
            current += ch;
        }
        params.push(current);
        return params
            .map(p => p.split(/[:=]/)[0].trim())
            .filter(p => p && !p.startsWith('*') && p !== '/');
    }

    function formatValue(value) {
        if (value === null || value === undefined) return null;
        if (Array.isArray(value)) return value.map(formatValue).filter(v => v !== null).join(', ');
        if (typeof value === 'string') return value;
        return JSON.stringify(value);
    }

    function containerSummary(category, metadata) {
        const field = key => formatValue((metadata || {})[key]) || 'unknown';
        if (category === 'sequence') {
            return 'Length: ' + field('length') + ', Element Types: ' + field('element_types');
        }
        if (category === 'dictionary') {
            return 'Length: ' + field('length') + ', Key Types: ' + field('key_types')
                + ', Value Types: ' + field('value_types');
        }
        return null;
    }

    function errorText(entry) {
        return entry.error_type + ': ' + entry.error;
    }

    function sorted(members) {
        return Object.entries(members || {}).sort(([a], [b]) => (a < b ? -1 : a > b ? 1 : 0));
    }

    function el(tag, cls, text) {
        const node = document.createElement(tag);
        if (cls) node.className = cls;
        if (text !== undefined) node.textContent = text;
        return node;
    }

    function row(label, kind, onClick) {
        const div = el('div', 'row', label);
        div.appendChild(el('span', 'kind', kind));
        if (onClick) div.addEventListener('click', onClick);
        return div;
    }

    function renderHeader(path, node) {
        tree.appendChild(el('h3', null, path + ' : ' + node.type + ' (' + node.category + ')'));
        if (node.doc) tree.appendChild(el('div', 'doc', node.doc));
        const meta = el('dl', 'meta');
        for (const [key, value] of sorted(node.metadata)) {
            const text = formatValue(value);
            if (text === null) continue;
            meta.appendChild(el('dt', null, key.replace(/_/g, ' ').toUpperCase()));
            meta.appendChild(el('dd', null, text));
        }
        if (meta.childNodes.length) tree.appendChild(meta);
    }

    function methodRow(path, category, name, m) {
        const target = childPath(path, category, name);
        if (m.type === 'error') return row(name, errorText(m), () => navigate(target));
        const sig = usableSignature(m.signature);
        const div = row(name + (sig || '()'), m.method_type || 'method', () => navigate(target));
        for (const decorator of m.decorators || []) div.appendChild(el('span', 'badge', decorator));
        if (m.is_runnable) {
            const run = el('button', 'run', 'run');
            run.addEventListener('click', ev => {
                ev.stopPropagation();
                code.value = target + '(' + parameterNames(sig).join(', ') + ')';
                code.focus();
            });
            div.appendChild(run);
        }
        const details = el('div', 'method');
        details.appendChild(div);
        if (m.return_type) details.appendChild(el('div', 'detail', 'Returns: ' + m.return_type));
        const flags = ['async', 'generator', 'property'].filter(flag => m['is_' + flag]);
        if (flags.length) details.appendChild(el('div', 'detail flags', flags.join(', ')));
        const doc = usableDoc(m.doc);
        if (doc) details.appendChild(el('div', 'doc', doc));
        if (m.source) {
            const source = el('details', 'source');
            source.appendChild(el('summary', null, m.source_file ? 'defined in ' + m.source_file : 'source'));
            source.appendChild(el('pre', null, m.source));
            details.appendChild(source);
        } else if (m.source_file) {
            details.appendChild(el('div', 'detail', 'defined in ' + m.source_file));
        }
        return details;
    }

    // Under sys.modules only one module per top-level package is listed.
    function visibleAttributes(path, attributes) {
        const entries = sorted(attributes);
        if (path !== 'sys.modules') return entries;
        const groups = new Map();
        for (const [name, a] of entries) {
            const top = name.split('.')[0];
            const current = groups.get(top);
            if (!current || (name === top && current[0] !== top)) groups.set(top, [name, a]);
        }
        return [...groups.values()];
    }

    function attributeRow(path, category, name, a) {
        const target = childPath(path, category, name);
        if (a.type === 'error') return row(name, errorText(a), () => navigate(target));
        const label = a.value !== undefined && a.value !== null ? name + ' = ' + a.value : name;
        const div = row(label, a.type, () => navigate(target));
        const summary = containerSummary(a.category, a.metadata);
        if (!summary) return div;
        const wrapper = el('div', 'attribute');
        wrapper.appendChild(div);
        wrapper.appendChild(el('div', 'detail summary', summary));
        return wrapper;
    }

    function section(title, rows) {
        if (!rows.length) return;
        tree.appendChild(el('h4', null, title));
        for (const r of rows) tree.appendChild(r);
    }

    function renderTree(message) {
        const node = message.data !== undefined ? message.data : message;
        const path = history.entries[history.index] || '';
        tree.innerHTML = '';
        if (node.type === 'error') {
            tree.appendChild(el('div', 'node-error', path + ': ' + errorText(node)));
            return;
        }
        renderHeader(path, node);
        section('Methods', sorted(node.methods).map(([name, m]) => methodRow(path, node.category, name, m)));
        section('Attributes', visibleAttributes(path, node.attributes)
            .map(([name, a]) => attributeRow(path, node.category, name, a)));
    }

    function setConnected(value) {
        connected = value;
        status.textContent = value ? 'Connected' : 'Waiting for Python connection...';
        status.className = value ? 'status connected' : 'status';
        code.disabled = !value;
        runBtn.disabled = !value;
    }

    function connect() {
        const proto = location.protocol === 'https:' ? 'wss:' : 'ws:';
        ws = new WebSocket(proto + '//' + location.host + '/ws');
        ws.onmessage = ev => {
            const { event, data } = JSON.parse(ev.data);
            switch (event) {
                case 'pythonStatus': setConnected(data); break;
                case 'output': append(data); break;
                case 'error': append('Error: ' + data, 'error'); break;
                case 'success': append(data.message, 'success'); break;
                case 'inspect_result': renderTree(data); break;
            }
        };
        ws.onclose = () => {
            setConnected(false);
            setTimeout(connect, 1000);
        };
    }

    function runBlock() {
        const block = code.value;
        if (!block.trim()) return;
        append('>>> ' + block.replace(/\n/g, '\n... '));
        send({ type: 'repl', code: block });
        code.value = '';
    }

    runBtn.addEventListener('click', runBlock);
    code.addEventListener('keydown', ev => {
        if (ev.key === 'Enter' && (ev.ctrlKey || ev.metaKey)) {
            ev.preventDefault();
            runBlock();
        }
    });
    document.getElementById('inspect').addEventListener('click', () => enterPath(pathInput.value));
    pathInput.addEventListener('keydown', ev => { if (ev.key === 'Enter') enterPath(pathInput.value); });
    document.getElementById('modules').addEventListener('click', () => enterPath('sys.modules'));
    backBtn.addEventListener('click', () => {
        if (history.index > 0) { history.index--; inspectCurrent(); }
    });
    forwardBtn.addEventListener('click', () => {
        if (history.index < history.entries.length - 1) { history.index++; inspectCurrent(); }
    });

    connect();
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    async fn get(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    #[tokio::test]
    async fn test_index_reflects_upstream_status() {
        let state = RelayState::new();
        let (status, body) = get(router(state.clone(), None), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Waiting for Python connection..."));

        state.broadcaster.set_upstream_connected(true).await;
        let (_, body) = get(router(state, None), "/").await;
        assert!(body.contains("status connected"));
    }

    #[tokio::test]
    async fn test_unknown_route_without_static_dir() {
        let (status, _) = get(router(RelayState::new(), None), "/health").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_static_assets_served_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("extra.css"), "body { color: red; }").unwrap();

        let app = router(RelayState::new(), Some(dir.path().to_path_buf()));
        let (status, body) = get(app.clone(), "/extra.css").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "body { color: red; }");

        let (status, _) = get(app, "/missing.js").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_page_renders_full_inspection_tree() {
        let (_, body) = get(router(RelayState::new(), None), "/").await;
        for needle in [
            "function renderHeader(",
            "toUpperCase()",
            "', Element Types: '",
            "', Key Types: '",
            "'Returns: '",
            "['async', 'generator', 'property']",
            "'No documentation available'",
            "else if (ch === quote) quote = null;",
            ".replace(/\\n/g, '\\\\n')",
            ".replace(/\\t/g, '\\\\t')",
        ] {
            assert!(body.contains(needle), "page script lacks {needle}");
        }
    }

    #[tokio::test]
    async fn test_ws_requires_upgrade() {
        let (status, _) = get(router(RelayState::new(), None), "/ws").await;
        assert!(status.is_client_error());
    }
}
