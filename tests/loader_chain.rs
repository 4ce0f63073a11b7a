//! 客户端加载链路端到端测试
//!
//! 用裸 TCP 假服务器驱动完整回退链：
//! 重试耗尽后推进候选、致命错误不重试、占位图保底、缓存命中与质量升级。

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use image_relay::loader::{
    CandidateKind, ImageLoader, ImageTypeHint, LoadConfig, LoadRequest, LoadStatus,
};

fn fast_config() -> LoadConfig {
    let mut config = LoadConfig::default();
    config.base_delay_ms = 10;
    config.attempt_timeout_ms = 2_000;
    config
}

/// 启动记录请求数的假服务器，对每个请求返回固定状态码与响应体。
fn spawn_origin(status_line: &'static str, body: &'static [u8], hits: Arc<AtomicUsize>) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind origin failed");
    let port = listener.local_addr().expect("read origin addr failed").port();

    thread::spawn(move || {
        for stream in listener.incoming() {
            let mut stream = match stream {
                Ok(stream) => stream,
                Err(_) => continue,
            };
            hits.fetch_add(1, Ordering::SeqCst);

            let mut req_buf = [0u8; 2048];
            let _ = stream.read(&mut req_buf);

            let headers = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/octet-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            let _ = stream.write_all(headers.as_bytes());
            let _ = stream.write_all(body);
            let _ = stream.flush();
        }
    });

    port
}

/// 按查询参数区分低/高保真响应的假代理端点，首个请求返回 500。
fn spawn_quality_aware_origin() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind origin failed");
    let port = listener.local_addr().expect("read origin addr failed").port();
    let served = Arc::new(AtomicUsize::new(0));

    thread::spawn(move || {
        for stream in listener.incoming() {
            let mut stream = match stream {
                Ok(stream) => stream,
                Err(_) => continue,
            };

            let mut req_buf = [0u8; 2048];
            let n = stream.read(&mut req_buf).unwrap_or(0);
            let request = String::from_utf8_lossy(&req_buf[..n]).to_string();

            let response = if served.fetch_add(1, Ordering::SeqCst) == 0 {
                "HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                    .to_string()
            } else {
                let body: &[u8] = if request.contains("quality=high") {
                    b"high-fidelity"
                } else {
                    b"low-fidelity"
                };
                let mut headers = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                );
                headers.push_str(&String::from_utf8_lossy(body));
                headers
            };

            let _ = stream.write_all(response.as_bytes());
            let _ = stream.flush();
        }
    });

    port
}

#[tokio::test]
async fn transient_failures_exhaust_retries_then_advance() {
    let failing_hits = Arc::new(AtomicUsize::new(0));
    let failing_port = spawn_origin("500 Internal Server Error", b"", Arc::clone(&failing_hits));

    let ok_hits = Arc::new(AtomicUsize::new(0));
    let ok_port = spawn_origin("200 OK", b"fallback-bytes", Arc::clone(&ok_hits));

    let loader = ImageLoader::new(fast_config()).expect("loader init failed");
    let handle = loader.load(LoadRequest {
        downloaded_url: Some(format!("http://127.0.0.1:{failing_port}/a.png")),
        original_url: format!("http://127.0.0.1:{ok_port}/a.png"),
        type_hint: ImageTypeHint::News,
    });

    let mut updates = handle.subscribe();
    updates
        .wait_for(|r| r.status == LoadStatus::Success)
        .await
        .expect("watch channel closed");

    let result = handle.current();
    assert_eq!(result.source, Some(CandidateKind::Original));
    assert_eq!(result.retry_count, 3);
    assert_eq!(
        result.bytes.expect("bytes missing").as_slice(),
        b"fallback-bytes"
    );

    // 第一候选按配置重试满 3 次
    assert_eq!(failing_hits.load(Ordering::SeqCst), 3);
    assert_eq!(ok_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn fatal_status_is_not_retried() {
    let forbidden_hits = Arc::new(AtomicUsize::new(0));
    let forbidden_port = spawn_origin("403 Forbidden", b"", Arc::clone(&forbidden_hits));

    let ok_hits = Arc::new(AtomicUsize::new(0));
    let ok_port = spawn_origin("200 OK", b"ok", Arc::clone(&ok_hits));

    let loader = ImageLoader::new(fast_config()).expect("loader init failed");
    let handle = loader.load(LoadRequest {
        downloaded_url: Some(format!("http://127.0.0.1:{forbidden_port}/x.png")),
        original_url: format!("http://127.0.0.1:{ok_port}/x.png"),
        type_hint: ImageTypeHint::Generic,
    });

    let mut updates = handle.subscribe();
    updates
        .wait_for(|r| r.status == LoadStatus::Success)
        .await
        .expect("watch channel closed");

    // 403 致命，单次尝试后立即推进
    assert_eq!(forbidden_hits.load(Ordering::SeqCst), 1);
    assert_eq!(handle.current().source, Some(CandidateKind::Original));
}

#[tokio::test]
async fn exhausted_chain_ends_on_placeholder_success() {
    // 显式关闭的端口，连接必然被拒绝
    let dead_port = {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind failed");
        listener.local_addr().expect("read addr failed").port()
    };

    let loader = ImageLoader::new(fast_config()).expect("loader init failed");
    let handle = loader.load(LoadRequest {
        downloaded_url: Some(format!("http://127.0.0.1:{dead_port}/a.png")),
        original_url: format!("http://127.0.0.1:{dead_port}/b.png"),
        type_hint: ImageTypeHint::Avatar,
    });

    let mut updates = handle.subscribe();
    updates
        .wait_for(|r| r.status == LoadStatus::Success)
        .await
        .expect("watch channel closed");

    let result = handle.current();
    assert_eq!(result.source, Some(CandidateKind::Placeholder));
    assert_eq!(result.status, LoadStatus::Success);
    assert!(result.error.is_some());
    assert!(!result.bytes.expect("bytes missing").is_empty());
}

#[tokio::test]
async fn second_load_of_same_url_hits_byte_cache() {
    let hits = Arc::new(AtomicUsize::new(0));
    let port = spawn_origin("200 OK", b"cached-bytes", Arc::clone(&hits));
    let url = format!("http://127.0.0.1:{port}/same.png");

    let loader = ImageLoader::new(fast_config()).expect("loader init failed");

    for _ in 0..2 {
        let handle = loader.load(LoadRequest {
            downloaded_url: None,
            original_url: url.clone(),
            type_hint: ImageTypeHint::Generic,
        });

        let mut updates = handle.subscribe();
        updates
            .wait_for(|r| r.status == LoadStatus::Success)
            .await
            .expect("watch channel closed");

        assert_eq!(
            handle.current().bytes.expect("bytes missing").as_slice(),
            b"cached-bytes"
        );
    }

    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn preload_warms_cache_for_later_load() {
    let hits = Arc::new(AtomicUsize::new(0));
    let port = spawn_origin("200 OK", b"warmed", Arc::clone(&hits));
    let request = LoadRequest {
        downloaded_url: None,
        original_url: format!("http://127.0.0.1:{port}/warm.png"),
        type_hint: ImageTypeHint::Generic,
    };

    let loader = ImageLoader::new(fast_config()).expect("loader init failed");
    loader.preload(&request);

    // 等待预热任务落入缓存
    for _ in 0..100 {
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        if hits.load(Ordering::SeqCst) == 1 {
            break;
        }
    }
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    // 再留出响应体写入缓存的时间
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    let handle = loader.load(request);
    let mut updates = handle.subscribe();
    updates
        .wait_for(|r| r.status == LoadStatus::Success)
        .await
        .expect("watch channel closed");

    assert_eq!(
        handle.current().bytes.expect("bytes missing").as_slice(),
        b"warmed"
    );
    // 正式加载命中缓存，源站不再被请求
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn successful_low_fidelity_load_upgrades_in_background() {
    let port = spawn_quality_aware_origin();

    let mut config = fast_config();
    config.proxy_base = Some(format!("http://127.0.0.1:{port}/image"));

    let loader = ImageLoader::new(config).expect("loader init failed");
    let handle = loader.load(LoadRequest {
        downloaded_url: None,
        original_url: "https://origin.example.com/big.png".to_string(),
        type_hint: ImageTypeHint::Preview,
    });

    let mut updates = handle.subscribe();
    let upgraded = updates
        .wait_for(|r| {
            r.status == LoadStatus::Success
                && r.bytes
                    .as_deref()
                    .map(|b| b.as_slice() == b"high-fidelity")
                    .unwrap_or(false)
        })
        .await
        .expect("watch channel closed")
        .clone();

    assert!(upgraded.url.contains("quality=high"));
    assert_eq!(upgraded.source, Some(CandidateKind::Original));
    // 升级快照刷新诊断字段：此前的失败描述不再残留
    assert!(upgraded.error.is_none());
    assert_eq!(upgraded.retry_count, 1);
}

/// 统计并发在途连接数的慢速假服务器。
fn spawn_concurrency_tracking_origin(
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind origin failed");
    let port = listener.local_addr().expect("read origin addr failed").port();

    thread::spawn(move || {
        for stream in listener.incoming() {
            let mut stream = match stream {
                Ok(stream) => stream,
                Err(_) => continue,
            };
            let in_flight = Arc::clone(&in_flight);
            let max_in_flight = Arc::clone(&max_in_flight);

            thread::spawn(move || {
                let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_in_flight.fetch_max(current, Ordering::SeqCst);

                let mut req_buf = [0u8; 2048];
                let _ = stream.read(&mut req_buf);
                thread::sleep(std::time::Duration::from_millis(120));

                let body = b"slow-body";
                let headers = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                );
                let _ = stream.write_all(headers.as_bytes());
                let _ = stream.write_all(body);
                let _ = stream.flush();

                in_flight.fetch_sub(1, Ordering::SeqCst);
            });
        }
    });

    port
}

/// 首个连接慢速返回旧内容，后续连接立刻返回新内容。
fn spawn_stale_then_fresh_origin() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind origin failed");
    let port = listener.local_addr().expect("read origin addr failed").port();
    let served = Arc::new(AtomicUsize::new(0));

    thread::spawn(move || {
        for stream in listener.incoming() {
            let mut stream = match stream {
                Ok(stream) => stream,
                Err(_) => continue,
            };
            let order = served.fetch_add(1, Ordering::SeqCst);

            thread::spawn(move || {
                let mut req_buf = [0u8; 2048];
                let _ = stream.read(&mut req_buf);

                let body: &[u8] = if order == 0 {
                    thread::sleep(std::time::Duration::from_millis(500));
                    b"stale"
                } else {
                    b"fresh"
                };

                let headers = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                );
                let _ = stream.write_all(headers.as_bytes());
                let _ = stream.write_all(body);
                let _ = stream.flush();
            });
        }
    });

    port
}

#[tokio::test]
async fn upgrade_fetches_respect_concurrency_limit() {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let max_in_flight = Arc::new(AtomicUsize::new(0));
    let port =
        spawn_concurrency_tracking_origin(Arc::clone(&in_flight), Arc::clone(&max_in_flight));

    let mut config = fast_config();
    config.max_concurrent_loads = 1;
    config.proxy_base = Some(format!("http://127.0.0.1:{port}/image"));

    let loader = ImageLoader::new(config).expect("loader init failed");
    let mut handles = Vec::new();
    for i in 0..3 {
        handles.push(loader.load(LoadRequest {
            downloaded_url: None,
            original_url: format!("https://origin.example.com/{i}.png"),
            type_hint: ImageTypeHint::Generic,
        }));
    }

    for handle in &handles {
        let mut updates = handle.subscribe();
        updates
            .wait_for(|r| r.status == LoadStatus::Success)
            .await
            .expect("watch channel closed");
    }

    // 等后台升级任务也全部完成
    for _ in 0..100 {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        if in_flight.load(Ordering::SeqCst) == 0 {
            break;
        }
    }

    assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn stale_generation_never_overwrites_retried_result() {
    let port = spawn_stale_then_fresh_origin();

    let loader = ImageLoader::new(fast_config()).expect("loader init failed");
    let handle = loader.load(LoadRequest {
        downloaded_url: None,
        original_url: format!("http://127.0.0.1:{port}/img.png"),
        type_hint: ImageTypeHint::Generic,
    });

    // 等首次尝试进入慢速在途状态后作废它
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    handle.retry();

    let mut updates = handle.subscribe();
    updates
        .wait_for(|r| r.status == LoadStatus::Success)
        .await
        .expect("watch channel closed");
    assert_eq!(
        handle.current().bytes.expect("bytes missing").as_slice(),
        b"fresh"
    );

    // 放慢速响应走完，其结果必须被丢弃
    tokio::time::sleep(std::time::Duration::from_millis(600)).await;
    assert_eq!(
        handle.current().bytes.expect("bytes missing").as_slice(),
        b"fresh"
    );
}

#[tokio::test]
async fn retry_restarts_chain_from_head() {
    let hits = Arc::new(AtomicUsize::new(0));
    let port = spawn_origin("200 OK", b"fresh", Arc::clone(&hits));

    let mut config = fast_config();
    config.enable_quality_upgrade = false;

    let loader = ImageLoader::new(config).expect("loader init failed");
    let handle = loader.load(LoadRequest {
        downloaded_url: None,
        original_url: format!("http://127.0.0.1:{port}/r.png"),
        type_hint: ImageTypeHint::Generic,
    });

    let mut updates = handle.subscribe();
    updates
        .wait_for(|r| r.status == LoadStatus::Success)
        .await
        .expect("watch channel closed");

    handle.retry();
    assert_eq!(handle.current().status, LoadStatus::Loading);

    let mut updates = handle.subscribe();
    updates
        .wait_for(|r| r.status == LoadStatus::Success)
        .await
        .expect("watch channel closed");

    assert_eq!(handle.current().source, Some(CandidateKind::Original));
}
