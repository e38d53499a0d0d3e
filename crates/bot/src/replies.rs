//! User-facing reply texts.

use std::{fmt::Write, path::Path};

use mangabot_downloads::{Artifact, QueueSnapshot};

/// Artifacts per block in the list reply.
pub const LIST_BATCH: usize = 5;

/// Artifact names shown in an "already downloaded" reply.
const FOUND_PREVIEW: usize = 3;

pub const GREETING_KEYWORDS: &[&str] = &["你好", "hi", "hello", "在吗"];

pub const NOT_UNDERSTOOD: &str = "❌ 命令格式错误，请输入有效的命令\n发送'漫画帮助'查看可用命令";

pub const GREETING: &str = "你好！我是漫画下载机器人，可以帮你下载漫画并转换成PDF哦~\n\
                            输入 '漫画帮助' 就可以查看我的使用方法啦~";

pub const STORAGE_MISSING: &str = "❌ 下载目录不存在！\n快让主人帮我检查一下ヽ(ﾟДﾟ)ﾉ";

pub const LIST_EMPTY: &str = "📚 目前没有已下载的漫画PDF文件！\n把想看的漫画ID都交给我吧~";

pub const PROGRESS_EMPTY: &str = "📊 当前没有任务在下载或等待中！\n发送'漫画下载 [ID]'开始下载漫画吧！";

pub const HELP: &str = "📚 漫画下载机器人使用指南 📚\n\n\
🌟 基本命令：\n\
• 漫画帮助 - 显示此帮助信息\n\
• 漫画下载 [ID] - 下载指定ID的漫画\n\
• 发送 [ID] - 发送已下载的漫画\n\
• 漫画列表 - 查看已下载的漫画列表\n\
• 查询漫画 [ID] - 查询漫画是否已下载\n\
• 下载进度 - 查看当前下载进度\n\
• 漫画版本 - 查看机器人版本信息\n\n\
💡 使用示例：\n\
• 私聊或@我发送：漫画下载 350234\n\
• 等待下载完成后发送：发送 350234\n\
• 查看已下载的漫画：漫画列表\n\n\
🔒 注意事项：\n\
• 每个漫画下载需要时间，请耐心等待\n\
• 下载完成后会自动转换为PDF格式并通知你\n\
• 多个下载任务按队列顺序依次进行\n\n\
🆘 遇到问题？请确保漫画ID正确，或联系管理员！";

pub fn version(version: &str, download_dir: &Path) -> String {
    format!(
        "🤖 漫画下载机器人\n版本: {version}\n状态: 运行中\n下载目录: {}\n\n💝 感谢使用！如有问题请联系管理员。",
        download_dir.display()
    )
}

pub fn handler_failed(what: &str, error: &dyn std::fmt::Display) -> String {
    format!("❌ {what}失败了(｡•﹃•｡)：{error}")
}

/// Numbered listing in blocks of [`LIST_BATCH`], followed by the total.
pub fn artifact_list(names: &[String]) -> String {
    if names.is_empty() {
        return LIST_EMPTY.to_string();
    }
    let mut out = String::from("📚 已下载的漫画列表：\n\n");
    for (batch_idx, batch) in names.chunks(LIST_BATCH).enumerate() {
        for (offset, name) in batch.iter().enumerate() {
            let _ = writeln!(out, "{}. {name}", batch_idx * LIST_BATCH + offset + 1);
        }
        out.push('\n');
    }
    let _ = write!(out, "总计：{} 个漫画PDF文件", names.len());
    out
}

pub fn in_flight(album_id: &str) -> String {
    format!("⏳ 漫画ID {album_id} 正在下载中！请耐心等待下载完成。")
}

pub fn in_flight_wait_to_deliver(album_id: &str) -> String {
    format!("⏳ 漫画ID {album_id} 正在下载中！请耐心等待下载完成后再尝试发送。")
}

pub fn already_stored(album_id: &str, artifacts: &[Artifact]) -> String {
    let mut out = format!("✅ 漫画ID {album_id} 已下载完成！\n发送'发送 {album_id}'即可获取文件。");
    if !artifacts.is_empty() {
        let preview: Vec<&str> = artifacts
            .iter()
            .take(FOUND_PREVIEW)
            .map(|a| a.name.as_str())
            .collect();
        let _ = write!(out, "\n文件列表: {}", preview.join(", "));
        if artifacts.len() > FOUND_PREVIEW {
            out.push_str("...");
        }
    }
    out
}

pub fn exists_found(album_id: &str, artifacts: &[Artifact]) -> String {
    let names: Vec<&str> = artifacts.iter().map(|a| a.name.as_str()).collect();
    format!(
        "✅ 漫画ID {album_id} 已下载！\n文件: {}\n发送'发送 {album_id}'即可获取文件。",
        names.join(", ")
    )
}

pub fn exists_missing(album_id: &str) -> String {
    format!("❌ 漫画ID {album_id} 尚未下载。\n发送'漫画下载 {album_id}'开始下载。")
}

pub fn already_queued(album_id: &str, position: usize) -> String {
    format!("⏳ 漫画ID {album_id} 已在下载队列中，当前位置: {position}")
}

pub fn accepted(album_id: &str, position: usize, queued: usize, in_flight: usize) -> String {
    format!(
        "✅ 已添加漫画ID {album_id} 到下载队列！\n\n\
         📊 当前状态:\n\
         • 正在下载: {in_flight} 个\n\
         • 队列等待: {queued} 个\n\
         • 你的位置: {position}\n\n\
         请耐心等待，下载完成后会通知你。\n\
         你可以发送'下载进度'查看当前进度。"
    )
}

pub fn not_downloaded(album_id: &str) -> String {
    format!(
        "❌ 漫画ID {album_id} 尚未下载完成或不存在！\n\n\
         你可以:\n\
         1. 发送'漫画下载 {album_id}'开始下载\n\
         2. 发送'漫画列表'查看已下载的漫画"
    )
}

pub fn preparing_delivery(album_id: &str, size_bytes: Option<u64>) -> String {
    let size = size_bytes
        .map(|bytes| format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0)))
        .unwrap_or_else(|| "未知".to_string());
    format!("📦 准备发送漫画: {album_id}\n📊 文件大小: {size}\n⏳ 正在发送中，请稍候...")
}

pub fn delivered(album_id: &str) -> String {
    format!("✅ 漫画 {album_id} 发送完成！请查收。")
}

pub fn progress(snapshot: &QueueSnapshot) -> String {
    if snapshot.is_empty() {
        return PROGRESS_EMPTY.to_string();
    }
    let mut out = String::from("📊 当前下载进度：\n\n");
    for (label, ids) in [("🔄 正在下载：", &snapshot.in_flight), ("⏳ 等待队列：", &snapshot.queued)] {
        if ids.is_empty() {
            continue;
        }
        let _ = writeln!(out, "{label}");
        for (idx, id) in ids.iter().enumerate() {
            let _ = writeln!(out, "  {}. {id}", idx + 1);
        }
        out.push('\n');
    }
    let _ = write!(
        out,
        "📈 总计：{} 个正在下载，{} 个等待中",
        snapshot.in_flight.len(),
        snapshot.queued.len()
    );
    out
}

pub fn self_id(self_id: Option<&str>) -> String {
    match self_id {
        Some(id) => format!("✅ 机器人ID: {id}"),
        None => "❌ 机器人ID未获取".to_string(),
    }
}

pub const TEST_FILE_START: &str = "🔍 开始测试文件发送功能...";

pub fn test_file_content(self_id: Option<&str>, unix_secs: u64) -> String {
    format!(
        "这是一个测试文件，用于验证机器人的文件发送功能。\n测试时间(unix): {unix_secs}\n机器人ID: {}\n",
        self_id.unwrap_or("未获取")
    )
}

pub fn download_ready(album_id: &str) -> String {
    format!("🎉 漫画ID {album_id} 下载完成！\n发送'发送 {album_id}'即可获取文件。")
}

pub fn download_failed(album_id: &str) -> String {
    format!("😢 漫画ID {album_id} 下载失败了，请确认ID是否正确后重新发送'漫画下载 {album_id}'。")
}
