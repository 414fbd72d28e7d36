/*!
Captured diagnostic output (trimmed) from the tool builds seen in the field.

Expected values under the built-in parsers are noted per fixture.
*/

/// procps-ng top: cpu 65.0, mem 25.0, swap 50.0
pub const TOP_PROCPS_NG: &str = "\
top - 10:00:01 up 3 days,  4:12,  2 users,  load average: 0.10, 0.20, 0.30
Tasks: 201 total,   1 running, 200 sleeping,   0 stopped,   0 zombie
%Cpu(s): 50.0 us, 15.0 sy,  0.0 ni, 35.0 id,  0.0 wa,  0.0 hi,  0.0 si,  0.0 st
MiB Mem :  16000.0 total,   7977.4 free,   4000.0 used,   4022.6 buff/cache
MiB Swap:   2048.0 total,   1024.0 free,   1024.0 used.  11541.6 avail Mem

    PID USER      PR  NI    VIRT    RES    SHR S  %CPU  %MEM     TIME+ COMMAND
      1 root      20   0  167744  12984   8420 S   0.0   0.1   0:03.21 systemd
    742 root      20   0   12172   7012   6124 S   0.0   0.0   0:00.02 sshd
";

/// legacy procps top: cpu 4.2, mem 25.0
pub const TOP_LEGACY: &str = "\
top - 10:00:01 up 41 days, 19:36,  1 user,  load average: 0.00, 0.01, 0.05
Tasks:  98 total,   1 running,  97 sleeping,   0 stopped,   0 zombie
Cpu(s):  3.1%us,  1.0%sy,  0.0%ni, 95.8%id,  0.0%wa,  0.0%hi,  0.1%si,  0.0%st
Mem:   8000000k total,  2000000k used,  6000000k free,   193908k buffers
Swap:  4000000k total,        0k used,  4000000k free,  1200000k cached
";

/// busybox top: cpu 3.0, mem 37.88 (used + free stands in for the missing total)
pub const TOP_BUSYBOX: &str = "\
Mem: 3035908K used, 4979588K free, 1124K shrd, 92452K buff, 1742880K cached
CPU:   2% usr   0% sys   0% nic  97% idle   0% io   0% irq   1% sirq
Load average: 0.00 0.01 0.05 1/118 2345
  PID  PPID USER     STAT   VSZ %VSZ CPU %CPU COMMAND
 2345  2301 root     R     1520   0%   0   0% top -b -n 1
";

/// procps-ng free: mem 25.0, swap 25.0
pub const FREE_PROCPS_NG: &str = "\
               total        used        free      shared  buff/cache   available
Mem:        16000000     4000000     8000000      512204     4000000    11000000
Swap:        2000000      500000     1500000
";

/// legacy free with the -/+ buffers row: mem 25.0
pub const FREE_LEGACY: &str = "\
             total       used       free     shared    buffers     cached
Mem:       8000000    2000000    6000000          0     193908    1200000
-/+ buffers/cache:     606092    7393908
Swap:      4000000          0    4000000
";

/// df -P --total: disk 37.0
pub const DF_TOTAL: &str = "\
Filesystem     1024-blocks     Used Available Capacity Mounted on
/dev/sda1          1000000   400000    600000      40% /
tmpfs               100000        0    100000       0% /run
total              1100000   400000    700000      37% -
";

/// df -P without a total row: disk 36.36
pub const DF_POSIX: &str = "\
Filesystem     1024-blocks     Used Available Capacity Mounted on
/dev/sda1          1000000   400000    600000      40% /
tmpfs               100000        0    100000       0% /run
";

/// plain df with a wrapped device name: disk 25.0
pub const DF_WRAPPED: &str = "\
Filesystem           1K-blocks      Used Available Use% Mounted on
/dev/mapper/very-long-volume-name
                          1000       500       500  50% /
/dev/sdb1                 1000         0      1000   0% /data
";

/// What a shell prints for a tool that is not installed
pub const COMMAND_NOT_FOUND: &str = "sh: 1: top: not found";
