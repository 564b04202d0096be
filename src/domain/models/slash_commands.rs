#[cfg(test)]
#[path = "slash_commands_test.rs"]
mod tests;

pub struct SlashCommand {
    command: String,
    pub args: Vec<String>,
}

impl SlashCommand {
    pub fn parse(text: &str) -> Option<SlashCommand> {
        let mut args = text
            .trim()
            .split(' ')
            .map(|e| return e.to_string())
            .collect::<Vec<String>>();
        let prefix = args[0].to_string();
        args.remove(0);

        let cmd = SlashCommand {
            command: prefix,
            args,
        };
        if cmd.is_quit()
            || cmd.is_load_older()
            || cmd.is_mark_read()
            || cmd.is_near_bottom()
            || cmd.is_away_from_bottom()
            || cmd.is_help()
        {
            return Some(cmd);
        }

        return None;
    }

    pub fn is_quit(&self) -> bool {
        return ["/q", "/quit", "/exit"].contains(&self.command.as_str());
    }

    pub fn is_load_older(&self) -> bool {
        return ["/o", "/older"].contains(&self.command.as_str());
    }

    pub fn is_mark_read(&self) -> bool {
        return ["/r", "/read"].contains(&self.command.as_str());
    }

    pub fn is_near_bottom(&self) -> bool {
        return ["/b", "/bottom"].contains(&self.command.as_str());
    }

    pub fn is_away_from_bottom(&self) -> bool {
        return ["/a", "/away"].contains(&self.command.as_str());
    }

    pub fn is_help(&self) -> bool {
        return ["/h", "/help"].contains(&self.command.as_str());
    }
}
