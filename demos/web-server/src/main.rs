//! Web front-end for the toplevel shell.
//!
//! Run with: cargo run -p web-server
//!
//! Then open http://localhost:3000 in your browser. Set `TOPLEVEL_CONFIG`
//! to a JSON file to override the shell configuration.

use std::net::SocketAddr;

use anyhow::Context;
use axum::{Router, response::Html, routing::get};
use demo_engine::DemoEngine;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use toplevel_core::ShellConfig;
use toplevel_transport::websocket::{WsState, create_ws_router};

fn load_config() -> anyhow::Result<ShellConfig> {
    match std::env::var_os("TOPLEVEL_CONFIG") {
        Some(path) => ShellConfig::from_json_file(&path)
            .with_context(|| format!("loading {}", path.to_string_lossy())),
        None => Ok(ShellConfig::default()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = load_config()?;
    let state = WsState::new(DemoEngine::new, config);

    let app = Router::new()
        .route("/", get(index_handler))
        .merge(create_ws_router(state))
        .layer(CorsLayer::permissive());

    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    tracing::info!("Server listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>Toplevel Shell</title>
    <style>
        body {
            margin: 0;
            padding: 20px;
            background: #1e1e1e;
            color: #d4d4d4;
            font-family: Menlo, Monaco, "Courier New", monospace;
        }
        h1 { color: #fff; margin-bottom: 10px; font-family: system-ui, sans-serif; }
        #output {
            height: calc(100vh - 160px);
            overflow-y: auto;
            white-space: pre-wrap;
        }
        .query { border-left: 2px solid #444; margin: 6px 0; padding-left: 8px; }
        .query.collapsed .answers { display: none; }
        .query-head { color: #9cdcfe; cursor: pointer; }
        .stderr { color: #e06c75; }
        #prompt { display: flex; gap: 8px; margin-top: 10px; }
        #input { flex: 1; background: #252526; color: #d4d4d4; border: 1px solid #444; font: inherit; padding: 4px; }
        .status { color: #888; font-size: 14px; margin-bottom: 10px; }
        .connected { color: #4a4; }
        .disconnected { color: #a44; }
    </style>
</head>
<body>
    <h1>Toplevel Shell</h1>
    <div class="status" id="status">Connecting...</div>
    <div id="output"></div>
    <div id="prompt">
        <span id="mode">?-</span>
        <input id="input" autofocus autocomplete="off" />
        <button id="abort">Abort</button>
    </div>

    <script>
        const output = document.getElementById('output');
        const input = document.getElementById('input');
        const modeLabel = document.getElementById('mode');
        const status = document.getElementById('status');
        const queries = new Map();
        let mode = 'idle';
        let ws;

        function send(msg) {
            if (ws && ws.readyState === WebSocket.OPEN) {
                ws.send(JSON.stringify(msg));
            }
        }

        function answerBox(target) {
            if (target.kind !== 'answer') return output;
            const q = queries.get(target.query);
            if (!q) return output;
            while (q.answers.children.length <= target.answer) {
                q.answers.appendChild(document.createElement('div'));
            }
            return q.answers.children[target.answer];
        }

        function appendFragment(target, fragment) {
            const span = document.createElement('span');
            span.textContent = fragment.text;
            if (fragment.channel === 'stderr') span.className = 'stderr';
            if (fragment.sgr) {
                if (fragment.sgr.color) span.style.color = fragment.sgr.color;
                if (fragment.sgr.background_color) span.style.background = fragment.sgr.background_color;
                if (fragment.sgr.bold) span.style.fontWeight = 'bold';
                if (fragment.sgr.underline) span.style.textDecoration = 'underline';
            }
            answerBox(target).appendChild(span);
            output.scrollTop = output.scrollHeight;
        }

        function startQuery(id, text) {
            const el = document.createElement('div');
            el.className = 'query';
            const head = document.createElement('div');
            head.className = 'query-head';
            head.textContent = '?- ' + text;
            head.onclick = () => send({ type: 'collapse', query: id });
            const answers = document.createElement('div');
            answers.className = 'answers';
            el.append(head, answers);
            output.appendChild(el);
            queries.set(id, { el, answers });
        }

        function applyEvent(event) {
            switch (event.type) {
                case 'output':
                    appendFragment(event.target, event.fragment);
                    break;
                case 'query_started':
                    startQuery(event.query, event.text);
                    break;
                case 'query_collapsed': {
                    const q = queries.get(event.query);
                    if (q) q.el.classList.toggle('collapsed', event.collapsed);
                    break;
                }
                case 'query_closed': {
                    const q = queries.get(event.query);
                    if (q) q.el.remove();
                    queries.delete(event.query);
                    break;
                }
                case 'mode_changed':
                    mode = event.mode;
                    modeLabel.textContent = {
                        awaiting_command: '?-',
                        awaiting_more: 'more',
                        tracing: 'trace',
                        running: '...',
                        host_delegated: 'host',
                        idle: 'idle',
                    }[mode] || mode;
                    break;
            }
        }

        function connect() {
            const protocol = window.location.protocol === 'https:' ? 'wss:' : 'ws:';
            ws = new WebSocket(`${protocol}//${window.location.host}/ws`);

            ws.onopen = () => {
                status.textContent = 'Connected';
                status.className = 'status connected';
            };

            ws.onclose = () => {
                status.textContent = 'Disconnected - reconnecting...';
                status.className = 'status disconnected';
                setTimeout(connect, 2000);
            };

            ws.onmessage = (event) => {
                try {
                    const msg = JSON.parse(event.data);
                    if (msg.type === 'event') {
                        applyEvent(msg.event);
                    } else if (msg.type === 'input_line') {
                        input.value = msg.text;
                    } else if (msg.type === 'session_started') {
                        output.innerHTML = '';
                        queries.clear();
                        console.log('Session started:', msg.session_id);
                    } else if (msg.type === 'error') {
                        status.textContent = 'Error: ' + msg.message;
                    }
                } catch (e) {
                    console.error('Failed to parse message:', e);
                }
            };
        }

        const moreKeys = { ';': 'redo', ' ': 'redo', 'n': 'redo', 'r': 'redo', 'Tab': 'redo',
                           '.': 'continue', 'c': 'continue', 'a': 'continue', 'Enter': 'continue' };
        const traceKeys = { 'c': 'creep', ' ': 'creep', 'Enter': 'creep', 'a': 'abort',
                            'g': 'goals', 'l': 'leap', 'L': 'listing', 'r': 'retry',
                            's': 'skip', 'n': 'nodebug', 'u': 'up', '?': 'help' };

        input.addEventListener('keydown', (e) => {
            if (e.ctrlKey && e.key === 'c') {
                e.preventDefault();
                send({ type: 'abort' });
            } else if (mode === 'awaiting_more' && moreKeys[e.key]) {
                e.preventDefault();
                send({ type: moreKeys[e.key] });
            } else if (mode === 'tracing' && traceKeys[e.key]) {
                e.preventDefault();
                send({ type: 'trace', action: traceKeys[e.key] });
            } else if (e.key === 'Enter') {
                e.preventDefault();
                send({ type: 'submit', text: input.value });
            } else if (e.key === 'ArrowUp' || e.key === 'ArrowDown') {
                e.preventDefault();
                send({ type: 'key', key: e.key === 'ArrowUp' ? 'up' : 'down' });
            }
        });

        document.getElementById('abort').onclick = () => send({ type: 'abort' });

        setInterval(() => send({ type: 'ping' }), 30000);
        connect();
    </script>
</body>
</html>
"#;
