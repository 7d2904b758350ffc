use faultscope::boundary::{BlockBuffer, Channel};
use std::time::{Duration, Instant};

fn drain(buf: &mut BlockBuffer, chunks: &[&str], channel: Channel) -> Vec<String> {
    let mut out = Vec::new();
    for c in chunks {
        out.extend(buf.push(c, channel));
    }
    out
}

#[test]
fn single_block_yields_exactly_one_entry() {
    let mut buf = BlockBuffer::new(50_000);
    let out = buf.push(
        "NullPointerException: x is null\n at pkg.Bar.baz(Bar.java:10)\n at pkg.Main.main(Main.java:5)\n\n",
        Channel::Primary,
    );
    assert_eq!(out.len(), 1);
    assert!(out[0].starts_with("NullPointerException"));
    assert!(out[0].ends_with("(Main.java:5)"));
    assert!(buf.finish().is_empty());
}

#[test]
fn chunks_split_mid_line_are_reassembled() {
    let mut buf = BlockBuffer::new(50_000);
    let out = drain(
        &mut buf,
        &["java.lang.IllegalState", "Exception: bad state\n\tat com.a.B.c(B.java:1)\n", "\tat com.a.D.e(D.java:2)", "\n", "\n"],
        Channel::Primary,
    );
    assert_eq!(out.len(), 1);
    assert_eq!(
        out[0],
        "java.lang.IllegalStateException: bad state\n\tat com.a.B.c(B.java:1)\n\tat com.a.D.e(D.java:2)"
    );
}

#[test]
fn plain_output_on_primary_never_opens_a_block() {
    let mut buf = BlockBuffer::new(50_000);
    let out = buf.push("Server started on port 8080\nready\n\n", Channel::Primary);
    assert!(out.is_empty());
    assert!(buf.finish().is_empty());
}

#[test]
fn secondary_channel_opens_on_any_line() {
    let mut buf = BlockBuffer::new(50_000);
    let out = buf.push("upstream returned garbage\n\n", Channel::Secondary);
    assert_eq!(out, vec!["upstream returned garbage".to_string()]);
}

#[test]
fn timestamped_line_terminates_and_starts_next_block() {
    let mut buf = BlockBuffer::new(50_000);
    let out = buf.push(
        "java.lang.RuntimeException: one\n\tat a.B.c(B.java:1)\n2024-01-01 10:00:00 ERROR second failure\n",
        Channel::Primary,
    );
    assert_eq!(out.len(), 1);
    assert!(out[0].contains("RuntimeException: one"));
    let rest = buf.finish();
    assert_eq!(rest, vec!["2024-01-01 10:00:00 ERROR second failure".to_string()]);
}

#[test]
fn severity_marker_line_ends_block() {
    let mut buf = BlockBuffer::new(50_000);
    let out = buf.push(
        "java.lang.RuntimeException: boom\n\tat a.B.c(B.java:1)\nINFO Started application\n",
        Channel::Primary,
    );
    assert_eq!(out.len(), 1);
    assert!(!out[0].contains("Started"));
    assert!(buf.finish().is_empty());
}

#[test]
fn structured_lines_continue_an_open_block() {
    let mut buf = BlockBuffer::new(50_000);
    let out = buf.push("HttpClientErrorException: 400 Bad Request\n{\"error\":\"bad\"}\n\n", Channel::Primary);
    assert_eq!(out.len(), 1);
    assert!(out[0].contains("{\"error\":\"bad\"}"));
}

#[test]
fn cause_chain_and_ellipsis_stay_in_block() {
    let mut buf = BlockBuffer::new(50_000);
    let out = buf.push(
        "com.acme.ServiceException: a\n\tat x.Y.z(Y.java:1)\nCaused by: java.io.IOException: b\n\t... 3 more\n\n",
        Channel::Primary,
    );
    assert_eq!(out.len(), 1);
    assert!(out[0].ends_with("... 3 more"));
}

#[test]
fn oversize_block_is_flushed_not_dropped() {
    let mut buf = BlockBuffer::new(200);
    let mut text = String::from("java.lang.RuntimeException: boom\n");
    for i in 0..50 {
        text.push_str(&format!("\tat com.example.Deep.frame{i}(Deep.java:{i})\n"));
    }
    text.push('\n');
    let out = buf.push(&text, Channel::Primary);
    assert_eq!(out.len(), 1);
    assert!(out[0].len() <= 200);
    assert!(out[0].starts_with("java.lang.RuntimeException: boom"));

    // The rest of the oversized trace is skipped; the next error is not.
    let next = buf.push("com.acme.NextException: again\n\n", Channel::Primary);
    assert_eq!(next.len(), 1);
    assert!(next[0].starts_with("com.acme.NextException"));
}

#[test]
fn oversize_single_line_is_cut_on_char_boundary() {
    let mut buf = BlockBuffer::new(64);
    let line = format!("java.lang.RuntimeException: {}\n", "é".repeat(100));
    let out = buf.push(&line, Channel::Primary);
    assert_eq!(out.len(), 1);
    assert!(out[0].len() <= 64);
}

#[test]
fn idle_buffer_is_flushed_after_timeout() {
    let mut buf = BlockBuffer::new(50_000);
    assert!(buf.push("java.lang.RuntimeException: pending\n", Channel::Primary).is_empty());
    assert!(buf.take_if_idle(Instant::now(), Duration::from_secs(3)).is_empty());
    let out = buf.take_if_idle(Instant::now() + Duration::from_secs(5), Duration::from_secs(3));
    assert_eq!(out, vec!["java.lang.RuntimeException: pending".to_string()]);
    assert!(!buf.has_pending());
}

#[test]
fn finish_flushes_dangling_partial_line() {
    let mut buf = BlockBuffer::new(50_000);
    assert!(buf.push("fatal: disk gone", Channel::Primary).is_empty());
    assert!(buf.has_pending());
    assert_eq!(buf.finish(), vec!["fatal: disk gone".to_string()]);
}

#[test]
fn logger_header_and_its_trace_form_one_block() {
    let mut buf = BlockBuffer::new(50_000);
    let text = "2024-05-01 12:00:00.123 ERROR 4242 --- [nio-8080-exec-1] o.a.c.c.C.[.[.[/].[dispatcherServlet] : Servlet.service() threw exception [Request processing failed; nested exception is java.lang.IllegalStateException: boom] with root cause\n\
                java.lang.IllegalStateException: boom\n\
                \tat com.shop.OrderService.place(OrderService.java:42)\n\
                \tat com.shop.OrderController.post(OrderController.java:17)\n\n";
    let mut out = buf.push(text, Channel::Primary);
    out.extend(buf.finish());
    assert_eq!(out.len(), 1);
    assert!(out[0].starts_with("2024-05-01 12:00:00.123 ERROR"));
    assert!(out[0].contains("\njava.lang.IllegalStateException: boom\n"));
    assert!(out[0].ends_with("(OrderController.java:17)"));
}

#[test]
fn thread_prefixed_exception_line_stays_in_block() {
    let mut buf = BlockBuffer::new(50_000);
    let out = buf.push(
        "Unhandled failure in worker\nException in thread \"main\" java.lang.RuntimeException: oops\n\tat a.B.c(B.java:1)\n\n",
        Channel::Secondary,
    );
    assert_eq!(out.len(), 1);
    assert!(out[0].contains("Exception in thread \"main\""));
}
