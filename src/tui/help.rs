use ratatui::{
    layout::Rect,
    style::Color,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

fn key_line(key: &'static str, desc: &'static str) -> Line<'static> {
    Line::from(vec![
        Span::raw("  "),
        Span::styled(format!("{key:<12}"), Style::default().fg(Color::Magenta)),
        Span::raw(desc),
    ])
}

pub fn draw_help(area: Rect, f: &mut Frame, base_url: &str) {
    let p = Paragraph::new(vec![
        Line::from("Global:"),
        key_line("q / Ctrl-C", "Quit"),
        key_line("tab", "Next tab (shift-tab: previous)"),
        key_line("?", "Show this help"),
        key_line("↑/↓", "Move between fields or rows"),
        key_line("enter", "Edit field / toggle flag / open row"),
        key_line("esc", "Finish editing; on Workflow, go back one step"),
        key_line("g", "Submit the form under the cursor"),
        Line::from(""),
        Line::from("Workflow:"),
        key_line("1 / 2 / 3", "Home: record a flow / manual tests / automation script"),
        key_line("x", "Recording: stop now; Trial run: stop the stream"),
        key_line("f", "Recording complete: ingest the recording; elsewhere: finish"),
        key_line("m / a / t", "Go to manual tests / automation script / trial run"),
        key_line("r", "Trial run: start"),
        key_line("u", "Manual tests: ingest the source document"),
        key_line("s", "Automation script: persist the script"),
        key_line("e", "Export script or manual test cases"),
        key_line("y", "Copy the script to the clipboard"),
        key_line("R", "Start a new flow"),
        Line::from(""),
        Line::from("Vector:"),
        key_line("l", "List recorded flows"),
        Line::from(""),
        Line::from("Jobs / History:"),
        key_line("enter", "Watch the selected job"),
        key_line("s", "Jobs: stop polling"),
        key_line("e", "Jobs: export the selected job as JSON"),
        key_line("c", "History: clear Jira ingestion history"),
        key_line("y", "Copy the last exported path"),
        Line::from(""),
        Line::from(vec![
            Span::raw("Backend: "),
            Span::styled(base_url.to_string(), Style::default().fg(Color::Cyan)),
        ]),
    ])
    .wrap(Wrap { trim: false })
    .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(p, area);
}
